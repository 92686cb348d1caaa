//! Types and settings every GrantScout crate agrees on.
//!
//! [`GrantScoutError`] and [`Result`] are the error model, [`Grant`] and
//! [`LogEntry`] are what a discovery run produces, and [`AppConfig`] is the
//! on-disk configuration the host turns into a [`SearchConfig`].

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExtractionConfig, NotificationConfig, SearchDefaults, config_dir,
    config_file_path, init_config, load_config, load_config_from, read_secret,
};
pub use error::{GrantScoutError, Result};
pub use types::{
    Grant, GrantId, GrantStatus, GroundingSource, LogEntry, LogLevel, SearchConfig,
    normalize_title,
};
