pub mod column;
pub mod common;
pub mod history;
pub mod project;
pub mod sync;
pub mod task;
