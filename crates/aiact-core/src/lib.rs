// Shared foundation for the aiact workspace: domain types, the application
// error hierarchy, configuration loading and SQLite persistence.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;

pub use error::{AppError, AppResult};
