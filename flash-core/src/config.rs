//! Service configuration loaded from `flashd.toml`.
//!
//! Every section is optional; missing values fall back to defaults that
//! drive an mbed-cli toolchain against `./main`.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:8080"
//! session_ttl_secs = 86400
//!
//! [workspace]
//! root = "./main"
//! source_file = "main.cpp"
//!
//! [toolchain]
//! program = "mbed"
//! args = ["compile", "-t", "GCC_ARM", "-m", "{target}", "--source", "{source_root}", "--build", "{build_dir}"]
//! artifact = "BUILD/main.bin"
//! timeout_secs = 300
//!
//! [deploy]
//! artifact_name = "main.bin"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::boards::BoardProfile;
use crate::error::{FlashError, Result};

/// Default file name looked up when no `--config` is given.
pub const CONFIG_FILE: &str = "flashd.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FlashConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub toolchain: ToolchainConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    /// Known boards offered to clients. Informational only.
    #[serde(default = "crate::boards::default_boards")]
    pub boards: Vec<BoardProfile>,
}

/// HTTP listener and session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the daemon binds to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Idle lifetime of a session before its configuration is dropped.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

fn default_max_source_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            session_ttl_secs: default_session_ttl(),
            max_source_bytes: default_max_source_bytes(),
        }
    }
}

/// Location of the build workspace.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory the toolchain builds in.
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,

    /// Source file name inside `root`.
    #[serde(default = "default_source_file")]
    pub source_file: String,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("main")
}

fn default_source_file() -> String {
    "main.cpp".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            source_file: default_source_file(),
        }
    }
}

/// External compiler invocation.
///
/// `args` may contain the placeholders `{target}`, `{source_root}` and
/// `{build_dir}`; each is substituted inside its own argument and never
/// passed through a shell.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Build output directory, relative to the workspace root.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Artifact produced by a successful build, relative to the workspace root.
    #[serde(default = "default_artifact")]
    pub artifact: PathBuf,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "mbed".to_string()
}

fn default_args() -> Vec<String> {
    [
        "compile",
        "-t",
        "GCC_ARM",
        "-m",
        "{target}",
        "--source",
        "{source_root}",
        "--build",
        "{build_dir}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_build_dir() -> String {
    "BUILD".to_string()
}

fn default_artifact() -> PathBuf {
    PathBuf::from("BUILD/main.bin")
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            build_dir: default_build_dir(),
            artifact: default_artifact(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolchainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How the artifact lands on the device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// File name written inside the destination directory.
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,
}

fn default_artifact_name() -> String {
    "main.bin".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            artifact_name: default_artifact_name(),
        }
    }
}

impl FlashConfig {
    /// Load configuration from `path`.
    ///
    /// A missing or unparseable file yields defaults; parse errors are logged
    /// as warnings.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match Self::from_toml_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }
        Self::default_with_boards()
    }

    /// Load configuration from `path`, failing on any read or parse error.
    pub fn load_strict(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FlashError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FlashConfig = toml::from_str(content).map_err(|e| FlashError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, including the built-in board catalog.
    pub fn default_with_boards() -> Self {
        Self {
            boards: crate::boards::default_boards(),
            ..Self::default()
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.toolchain.program.trim().is_empty() {
            return Err(FlashError::Config {
                message: "toolchain.program must not be empty".to_string(),
            });
        }
        if self.toolchain.timeout_secs == 0 {
            return Err(FlashError::Config {
                message: "toolchain.timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.workspace.source_file.is_empty() || self.deploy.artifact_name.is_empty() {
            return Err(FlashError::Config {
                message: "workspace.source_file and deploy.artifact_name must be set".to_string(),
            });
        }
        if self.toolchain.artifact.is_absolute() {
            return Err(FlashError::Config {
                message: "toolchain.artifact must be relative to the workspace root".to_string(),
            });
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.server.session_ttl_secs)
    }
}
