//! Parsing and validation of `stitch.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`ProjectConfig`], plus the resolution step that turns configured modules
//! into concrete compile tasks with absolute paths.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{
    resolve_module, resolve_modules, resolve_packager, task_key, ResolvedModule,
    ResolvedPackager, ResolvedTask,
};
pub use types::*;
