//! Host-side bootstrap helpers for bootkit processes.
//!
//! Everything here runs before the core takes over: command line options,
//! `.env` loading, the YAML configuration document with `${NAME}` expansion,
//! logging, and shutdown signal listening.

pub mod config;
pub mod env;
pub mod logging;
pub mod options;
pub mod paths;
pub mod signals;

pub use config::*;
pub use env::{env_overrides, expand_env, expand_env_with, expand_yaml_env, load_dotenv};
pub use logging::init_logging;
pub use options::BootOptions;
pub use paths::{resolve_root_dir, RootDirError};
pub use signals::*;
