use clap::Parser;
use std::path::PathBuf;

/// Default configuration file name looked up under the root directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Process entry flags consumed by the bootstrap orchestrator.
///
/// Flag names keep their camelCase spelling (`--rootDir`, `--configFileName`)
/// so existing deployment scripts keep working.
#[derive(Debug, Clone, Parser, PartialEq, Eq)]
#[command(name = "bootkit")]
#[command(about = "Bootstrap options for a bootkit process")]
pub struct BootOptions {
    /// Directory the configuration file (and relative log files) live in
    #[arg(long = "rootDir", default_value = ".")]
    pub root_dir: PathBuf,

    /// Configuration file name, relative to the root directory
    #[arg(long = "configFileName", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file_name: String,

    /// Raise the default console log level to debug
    #[arg(long)]
    pub debug: bool,

    /// Testing mode: units may swap in fakes, global logging is not installed
    #[arg(long)]
    pub testing: bool,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            config_file_name: DEFAULT_CONFIG_FILE.to_string(),
            debug: false,
            testing: false,
        }
    }
}

impl BootOptions {
    /// Parse options from the process arguments.
    ///
    /// Exits the process on `--help` or malformed arguments, like any clap CLI.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// `{root_dir}/{config_file_name}` without any normalization.
    pub fn config_path(&self) -> PathBuf {
        self.root_dir.join(&self.config_file_name)
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn with_config_file(mut self, name: impl Into<String>) -> Self {
        self.config_file_name = name.into();
        self
    }

    pub fn testing(mut self) -> Self {
        self.testing = true;
        self
    }
}
