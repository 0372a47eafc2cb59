//! # Census Common Library
//!
//! Shared code for the household census crates including:
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - Tracing subscriber setup
//! - Database initialization and schema migrations
//! - Date helpers

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod time;

pub use config::{CensusConfig, EligibilityRules, LoggingConfig, RootFolderResolver};
pub use error::{Error, Result};
