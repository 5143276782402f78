//! Moves the build artifact onto the device.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ConfigKey, FlashError, Result};
use crate::workspace::BuildWorkspace;

/// Where an artifact ended up.
#[derive(Debug, Clone)]
pub struct Deployed {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Moves the workspace artifact into a destination directory.
#[derive(Debug, Clone)]
pub struct ArtifactRelocator {
    artifact_name: String,
}

impl ArtifactRelocator {
    pub fn new(artifact_name: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
        }
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Move the artifact to `<destination>/<artifact_name>`, replacing any file there.
    ///
    /// The destination must already exist as a directory.
    pub async fn relocate(&self, workspace: &BuildWorkspace, destination: Option<&str>) -> Result<Deployed> {
        let destination = match destination {
            Some(d) if !d.trim().is_empty() => Path::new(d),
            _ => return Err(FlashError::ConfigMissing(ConfigKey::Destination)),
        };

        let is_dir = tokio::fs::metadata(destination)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(FlashError::DestinationUnavailable {
                path: destination.to_path_buf(),
            });
        }

        let source = workspace.artifact_path();
        let bytes = match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(FlashError::ArtifactMissing { path: source }),
        };

        let target = destination.join(&self.artifact_name);
        move_file(&source, &target).await?;

        info!("Deployed {} ({} bytes)", target.display(), bytes);
        Ok(Deployed { path: target, bytes })
    }
}

/// Rename, falling back to copy + remove when the paths are on different filesystems.
///
/// Once the copy has landed the artifact counts as deployed; failing to
/// remove the workspace copy is only logged.
async fn move_file(source: &Path, target: &Path) -> Result<()> {
    match tokio::fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("{} is on another filesystem; copying instead", target.display());
            tokio::fs::copy(source, target)
                .await
                .map_err(|e| FlashError::io(target, e))?;
            if let Err(e) = tokio::fs::remove_file(source).await {
                warn!("Deployed, but could not remove {}: {}", source.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(FlashError::io(target, e)),
    }
}

#[cfg(windows)]
const ERROR_NOT_SAME_DEVICE: i32 = 17;

fn is_cross_device(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(windows)]
    {
        e.raw_os_error() == Some(ERROR_NOT_SAME_DEVICE)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn workspace_with_artifact(root: &Path, content: &[u8]) -> BuildWorkspace {
        let ws = BuildWorkspace::new(root, "main.cpp", "BUILD", "BUILD/main.bin");
        std::fs::create_dir_all(root.join("BUILD")).unwrap();
        std::fs::write(ws.artifact_path(), content).unwrap();
        ws
    }

    #[tokio::test]
    async fn test_relocate_moves_and_overwrites() {
        let build = tempdir().unwrap();
        let device = tempdir().unwrap();
        let ws = workspace_with_artifact(build.path(), b"\x7fNEW");
        std::fs::write(device.path().join("main.bin"), b"OLD FIRMWARE").unwrap();

        let relocator = ArtifactRelocator::new("main.bin");
        let deployed = relocator
            .relocate(&ws, device.path().to_str())
            .await
            .unwrap();

        assert_eq!(deployed.path, device.path().join("main.bin"));
        assert_eq!(deployed.bytes, 4);
        assert_eq!(std::fs::read(&deployed.path).unwrap(), b"\x7fNEW");
        assert!(!ws.artifact_path().exists());
    }

    #[tokio::test]
    async fn test_missing_destination_directory() {
        let build = tempdir().unwrap();
        let device = tempdir().unwrap();
        let ws = workspace_with_artifact(build.path(), b"bin");
        let missing = device.path().join("not-mounted");

        let err = ArtifactRelocator::new("main.bin")
            .relocate(&ws, missing.to_str())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(ws.artifact_path().exists());
    }

    #[tokio::test]
    async fn test_rename_error_does_not_fall_back_to_copy() {
        let build = tempdir().unwrap();
        let device = tempdir().unwrap();
        let ws = workspace_with_artifact(build.path(), b"bin");
        std::fs::create_dir(device.path().join("main.bin")).unwrap();
        std::fs::write(device.path().join("main.bin/keep"), b"x").unwrap();

        let err = ArtifactRelocator::new("main.bin")
            .relocate(&ws, device.path().to_str())
            .await
            .unwrap_err();
        assert!(matches!(err, FlashError::Io { .. }));
        assert!(ws.artifact_path().exists());
        assert!(device.path().join("main.bin/keep").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_cross_device_detection() {
        assert!(is_cross_device(&std::io::Error::from_raw_os_error(libc::EXDEV)));
        assert!(!is_cross_device(&std::io::Error::from_raw_os_error(libc::EACCES)));
        assert!(!is_cross_device(&std::io::Error::new(std::io::ErrorKind::Other, "boom")));
    }

    #[tokio::test]
    async fn test_unset_destination() {
        let build = tempdir().unwrap();
        let ws = workspace_with_artifact(build.path(), b"bin");

        let err = ArtifactRelocator::new("main.bin")
            .relocate(&ws, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_build_failure() {
        let build = tempdir().unwrap();
        let device = tempdir().unwrap();
        let ws = BuildWorkspace::new(build.path(), "main.cpp", "BUILD", "BUILD/main.bin");

        let err = ArtifactRelocator::new("main.bin")
            .relocate(&ws, device.path().to_str())
            .await
            .unwrap_err();
        assert!(matches!(err, FlashError::ArtifactMissing { .. }));
        assert_eq!(err.kind(), ErrorKind::BuildFailed);
    }
}
