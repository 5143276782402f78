//! Error types for flash-core.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for flash-core operations.
pub type Result<T> = std::result::Result<T, FlashError>;

/// Session settings a build depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    Target,
    Destination,
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKey::Target => f.write_str("target board"),
            ConfigKey::Destination => f.write_str("destination path"),
        }
    }
}

/// Coarse failure classes reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigMissing,
    IoError,
    BuildFailed,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigMissing => "config_missing",
            ErrorKind::IoError => "io_error",
            ErrorKind::BuildFailed => "build_failed",
            ErrorKind::Timeout => "timeout",
        }
    }
}

/// Errors that can occur while building and deploying firmware.
#[derive(Error, Debug)]
pub enum FlashError {
    /// A session setting was not configured before the build.
    #[error("No {0} configured for this session")]
    ConfigMissing(ConfigKey),

    /// Filesystem failure while writing the source or moving the artifact.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        /// Path being operated on.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The toolchain could not be started.
    #[error("Failed to launch toolchain '{program}': {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Toolchain exited with a non-zero status.
    #[error("Toolchain exited with {}", .exit_code.map(|c| format!("code {c}")).unwrap_or_else(|| "a signal".to_string()))]
    BuildFailed {
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Last lines of toolchain output.
        log_tail: String,
    },

    /// Toolchain reported success but left no artifact behind.
    #[error("Toolchain produced no artifact at {}", .path.display())]
    ArtifactMissing {
        /// Expected artifact location.
        path: PathBuf,
    },

    /// Destination is missing or not a directory.
    #[error("Destination {} is not an existing directory", .path.display())]
    DestinationUnavailable {
        /// Configured destination.
        path: PathBuf,
    },

    /// Toolchain ran past its allotted time and was killed.
    #[error("Toolchain timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Limit that was exceeded.
        timeout: Duration,
    },

    /// Invalid service configuration.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl FlashError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FlashError::Io {
            path: path.into(),
            source,
        }
    }

    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlashError::ConfigMissing(_) | FlashError::Config { .. } => ErrorKind::ConfigMissing,
            FlashError::Io { .. } | FlashError::Spawn { .. } | FlashError::DestinationUnavailable { .. } => {
                ErrorKind::IoError
            }
            FlashError::BuildFailed { .. } | FlashError::ArtifactMissing { .. } => ErrorKind::BuildFailed,
            FlashError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Captured toolchain output, if any.
    pub fn log_tail(&self) -> Option<&str> {
        match self {
            FlashError::BuildFailed { log_tail, .. } if !log_tail.is_empty() => Some(log_tail.as_str()),
            _ => None,
        }
    }
}
