//! Build-and-deploy pipeline.
//!
//! One run walks `Idle -> Writing -> Building -> Relocating -> Done`; any
//! fault moves it to `Failed` with the stage it happened in. Runs against
//! the same workspace are serialized for their whole duration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::FlashConfig;
use crate::error::{ConfigKey, ErrorKind, FlashError};
use crate::relocate::ArtifactRelocator;
use crate::session::SessionConfig;
use crate::toolchain::Toolchain;
use crate::workspace::BuildWorkspace;

/// Capacity of the event channel; slow subscribers lag rather than block runs.
const EVENT_CAPACITY: usize = 256;

/// Source submitted for one build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub source: String,
}

impl BuildRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// States of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Writing,
    Building,
    Relocating,
    Done,
    Failed,
}

/// Step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuring,
    Writing,
    Building,
    Relocating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuring => "configuring",
            Stage::Writing => "writing",
            Stage::Building => "building",
            Stage::Relocating => "relocating",
        };
        f.write_str(name)
    }
}

/// Summary of a run that reached `Done`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub target: String,
    pub artifact: PathBuf,
    pub artifact_bytes: u64,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// A run that reached `Failed`.
#[derive(Debug, Clone, Error, Serialize)]
#[error("Build {build_id} failed while {stage}: {message}")]
pub struct PipelineFailure {
    pub build_id: Uuid,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    pub log_tail: Option<String>,
}

impl PipelineFailure {
    fn new(build_id: Uuid, stage: Stage, error: FlashError) -> Self {
        Self {
            build_id,
            stage,
            kind: error.kind(),
            log_tail: error.log_tail().map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// Progress notifications published for every run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    /// Run accepted
    BuildStarted { build_id: Uuid },
    /// Run moved to a new state
    StateChanged { build_id: Uuid, state: PipelineState },
    /// Artifact deployed
    BuildCompleted { report: BuildReport },
    /// Run aborted
    BuildFailed { failure: PipelineFailure },
}

/// Sequences source intake, toolchain invocation and artifact relocation.
#[derive(Clone)]
pub struct Pipeline {
    workspace: Arc<BuildWorkspace>,
    toolchain: Toolchain,
    relocator: ArtifactRelocator,
    events: broadcast::Sender<BuildEvent>,
}

impl Pipeline {
    pub fn new(workspace: Arc<BuildWorkspace>, toolchain: Toolchain, relocator: ArtifactRelocator) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            workspace,
            toolchain,
            relocator,
            events,
        }
    }

    pub fn from_config(config: &FlashConfig) -> Self {
        Self::new(
            Arc::new(BuildWorkspace::from_config(config)),
            Toolchain::from_config(&config.toolchain),
            ArtifactRelocator::new(config.deploy.artifact_name.clone()),
        )
    }

    pub fn workspace(&self) -> &BuildWorkspace {
        &self.workspace
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Subscribe to build events.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: BuildEvent) {
        let _ = self.events.send(event);
    }

    fn enter(&self, build_id: Uuid, state: PipelineState) {
        self.broadcast(BuildEvent::StateChanged { build_id, state });
    }

    fn fail(&self, build_id: Uuid, stage: Stage, error: FlashError) -> PipelineFailure {
        let failure = PipelineFailure::new(build_id, stage, error);
        warn!("{}", failure);
        self.enter(build_id, PipelineState::Failed);
        self.broadcast(BuildEvent::BuildFailed {
            failure: failure.clone(),
        });
        failure
    }

    /// Run one build to completion.
    ///
    /// Both target and destination must be configured; otherwise the run
    /// fails before touching the workspace. Dropping the returned future
    /// kills a running toolchain and releases the workspace.
    pub async fn run(&self, request: BuildRequest, config: &SessionConfig) -> Result<BuildReport, PipelineFailure> {
        let build_id = Uuid::new_v4();
        let start = Instant::now();
        self.broadcast(BuildEvent::BuildStarted { build_id });
        self.enter(build_id, PipelineState::Idle);

        let Some(target) = non_empty(config.target.as_deref()) else {
            return Err(self.fail(build_id, Stage::Configuring, FlashError::ConfigMissing(ConfigKey::Target)));
        };
        let Some(destination) = non_empty(config.destination.as_deref()) else {
            return Err(self.fail(
                build_id,
                Stage::Configuring,
                FlashError::ConfigMissing(ConfigKey::Destination),
            ));
        };

        let _guard = self.workspace.lock().await;
        info!("Build {} for {} -> {}", build_id, target, destination);

        self.enter(build_id, PipelineState::Writing);
        if let Err(e) = self.workspace.submit(&request.source).await {
            return Err(self.fail(build_id, Stage::Writing, e));
        }

        self.enter(build_id, PipelineState::Building);
        let built = match self.workspace.clear_artifact().await {
            Ok(()) => self
                .toolchain
                .invoke(&self.workspace, Some(target))
                .await
                .and_then(|invocation| invocation.into_result()),
            Err(e) => Err(e),
        };
        if let Err(e) = built {
            return Err(self.fail(build_id, Stage::Building, e));
        }

        self.enter(build_id, PipelineState::Relocating);
        let deployed = match self.relocator.relocate(&self.workspace, Some(destination)).await {
            Ok(deployed) => deployed,
            Err(e) => return Err(self.fail(build_id, Stage::Relocating, e)),
        };

        let report = BuildReport {
            build_id,
            target: target.to_string(),
            artifact: deployed.path,
            artifact_bytes: deployed.bytes,
            duration_ms: start.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        };
        info!("Build {} done in {}ms", build_id, report.duration_ms);

        self.enter(build_id, PipelineState::Done);
        self.broadcast(BuildEvent::BuildCompleted {
            report: report.clone(),
        });
        Ok(report)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn pipeline(root: &std::path::Path) -> Pipeline {
        Pipeline::new(
            Arc::new(BuildWorkspace::new(root, "main.cpp", "BUILD", "BUILD/main.bin")),
            Toolchain::new("definitely-not-a-real-program", vec![], Duration::from_secs(1)),
            ArtifactRelocator::new("main.bin"),
        )
    }

    #[tokio::test]
    async fn test_missing_target_never_writes_workspace() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let config = SessionConfig {
            target: None,
            destination: Some("/mnt/device".into()),
        };

        let failure = pipeline
            .run(BuildRequest::new("int main(){}"), &config)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Configuring);
        assert_eq!(failure.kind, ErrorKind::ConfigMissing);
        assert!(!pipeline.workspace().source_path().exists());
    }

    #[tokio::test]
    async fn test_events_follow_state_machine() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let mut rx = pipeline.subscribe();
        let config = SessionConfig {
            target: Some("NUCLEO_F401RE".into()),
            destination: Some(dir.path().display().to_string()),
        };

        let failure = pipeline
            .run(BuildRequest::new("int main(){}"), &config)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Building);

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BuildEvent::StateChanged { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                PipelineState::Idle,
                PipelineState::Writing,
                PipelineState::Building,
                PipelineState::Failed
            ]
        );
    }

    #[test]
    fn test_failure_display() {
        let failure = PipelineFailure::new(
            Uuid::nil(),
            Stage::Relocating,
            FlashError::DestinationUnavailable {
                path: PathBuf::from("/mnt/device"),
            },
        );
        assert_eq!(failure.kind, ErrorKind::IoError);
        assert!(failure.to_string().contains("while relocating"));
        assert!(failure.to_string().contains("/mnt/device"));
    }
}
