//! Build workspace and source intake.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::FlashConfig;
use crate::error::{FlashError, Result};

/// Directory the toolchain builds in.
///
/// Holds exactly one source file and at most one artifact. Runs that touch
/// either must hold the guard returned by [`BuildWorkspace::lock`].
#[derive(Debug)]
pub struct BuildWorkspace {
    root: PathBuf,
    source_file: String,
    build_dir: String,
    artifact: PathBuf,
    lock: Mutex<()>,
}

impl BuildWorkspace {
    pub fn new(
        root: impl Into<PathBuf>,
        source_file: impl Into<String>,
        build_dir: impl Into<String>,
        artifact: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            source_file: source_file.into(),
            build_dir: build_dir.into(),
            artifact: artifact.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &FlashConfig) -> Self {
        Self::new(
            config.workspace.root.clone(),
            config.workspace.source_file.clone(),
            config.toolchain.build_dir.clone(),
            config.toolchain.artifact.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_path(&self) -> PathBuf {
        self.root.join(&self.source_file)
    }

    pub fn build_dir(&self) -> &str {
        &self.build_dir
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.root.join(&self.artifact)
    }

    /// Exclusive access for one pipeline run.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Write `source` to the workspace source file, replacing any previous content.
    ///
    /// The file handle is closed before this returns, success or not.
    pub async fn submit(&self, source: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| FlashError::io(&self.root, e))?;

        let path = self.source_path();
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| FlashError::io(&path, e))?;
        file.write_all(source.as_bytes())
            .await
            .map_err(|e| FlashError::io(&path, e))?;
        file.flush().await.map_err(|e| FlashError::io(&path, e))?;
        drop(file);

        debug!("Wrote {} bytes to {}", source.len(), path.display());
        Ok(())
    }

    /// Current content of the source file.
    pub async fn read_source(&self) -> Result<String> {
        let path = self.source_path();
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FlashError::io(&path, e))
    }

    /// Remove an artifact left over from an earlier build.
    pub async fn clear_artifact(&self) -> Result<()> {
        let path = self.artifact_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed stale artifact {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FlashError::io(&path, e)),
        }
    }
}
