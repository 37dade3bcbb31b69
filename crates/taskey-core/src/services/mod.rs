//! Services shared by Taskey front ends

pub mod database;

pub use database::DatabaseService;
