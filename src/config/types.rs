use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Upper bound on correlated request slots; the packed code keeps 16 bits for the slot.
pub const MAX_REQUEST_SLOTS: u32 = 0xfffe;

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings threaded into every registry at construction time.
///
/// Child registries inherit the parent's copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Emit per-operation debug events (default: false).
    #[serde(default)]
    pub debug_logging: bool,
    /// Maximum outstanding correlated requests (default: 0xfffe).
    #[serde(default = "default_max_pending_requests")]
    pub max_pending_requests: u32,
}

/// Tracing subscriber settings used by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: "info").
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Write logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Colorize stderr output (default: true).
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_max_pending_requests() -> u32 {
    MAX_REQUEST_SLOTS
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            max_pending_requests: default_max_pending_requests(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
            ansi: default_ansi(),
        }
    }
}
