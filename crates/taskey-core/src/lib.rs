//! taskey-core - Core library for Taskey
//!
//! This crate contains the local task store, its change log, and the engine
//! that synchronizes it with a remote workspace. Front ends (the CLI, future
//! desktop shells) build on [`services::DatabaseService`] and [`sync::SyncEngine`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use services::DatabaseService;
pub use state::ConnectionState;
