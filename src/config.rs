//! Runtime configuration
//!
//! Loaded from TOML (a file named by `NATIVEIMPL_CONFIG`, or a string), then
//! overridden field by field from `NATIVEIMPL_*` environment variables.
//! Every field has a default, so an empty document is a valid config.

use crate::error::RuntimeError;
use crate::logging::{env_flag, LogConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What a protocol error does to the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalMode {
    /// Unwind; lets Rust tests observe the failure
    #[default]
    Panic,
    /// Abort the process
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub fatal_mode: FatalMode,

    /// Maximum queued cross-thread callbacks; 0 is unbounded
    pub dispatch_queue_bound: usize,

    /// Clear both safety areas at the start of each top-level invocation
    pub auto_clear_safety_area: bool,

    /// Log the stack depth change of every invocation
    pub strict_balance: bool,

    /// Log the table dump when the runtime shuts down
    pub dump_on_shutdown: bool,

    pub log: LogConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fatal_mode: FatalMode::Panic,
            dispatch_queue_bound: 0,
            auto_clear_safety_area: false,
            strict_balance: cfg!(debug_assertions),
            dump_on_shutdown: false,
            log: LogConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, RuntimeError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = fs::read_to_string(path).map_err(|source| RuntimeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Configuration for the process-wide runtime
    ///
    /// Reads `NATIVEIMPL_CONFIG` if set, then applies environment overrides.
    pub fn from_env() -> Result<Self, RuntimeError> {
        let mut config = match std::env::var_os("NATIVEIMPL_CONFIG") {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Override fields from `NATIVEIMPL_*` variables
    pub fn apply_env(&mut self) {
        if let Ok(mode) = std::env::var("NATIVEIMPL_FATAL_MODE") {
            match mode.to_lowercase().as_str() {
                "panic" => self.fatal_mode = FatalMode::Panic,
                "abort" => self.fatal_mode = FatalMode::Abort,
                _ => {}
            }
        }

        if let Some(bound) = std::env::var("NATIVEIMPL_DISPATCH_QUEUE_BOUND")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.dispatch_queue_bound = bound;
        }

        if let Some(flag) = env_flag("NATIVEIMPL_AUTO_CLEAR_SAFETY_AREA") {
            self.auto_clear_safety_area = flag;
        }
        if let Some(flag) = env_flag("NATIVEIMPL_STRICT_BALANCE") {
            self.strict_balance = flag;
        }
        if let Some(flag) = env_flag("NATIVEIMPL_DUMP_ON_SHUTDOWN") {
            self.dump_on_shutdown = flag;
        }

        self.log.apply_env();
    }
}
