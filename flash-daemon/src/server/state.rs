//! Shared application state for the server.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};

use flash_core::{BoardProfile, BuildEvent, BuildReport, FlashConfig, Pipeline, PipelineFailure, SessionStore};

/// Outcome of the most recent build, for `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LastBuild {
    Done {
        target: String,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
    },
    Failed {
        stage: String,
        kind: String,
        message: String,
        failed_at: DateTime<Utc>,
    },
}

/// Build counters.
#[derive(Default)]
pub struct BuildStats {
    total: AtomicU64,
    failed: AtomicU64,
    last: RwLock<Option<LastBuild>>,
}

impl BuildStats {
    pub async fn record(&self, outcome: &Result<BuildReport, PipelineFailure>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let last = match outcome {
            Ok(report) => LastBuild::Done {
                target: report.target.clone(),
                finished_at: report.finished_at,
                duration_ms: report.duration_ms,
            },
            Err(failure) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                LastBuild::Failed {
                    stage: failure.stage.to_string(),
                    kind: failure.kind.as_str().to_string(),
                    message: failure.message.clone(),
                    failed_at: Utc::now(),
                }
            }
        };
        *self.last.write().await = Some(last);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub async fn last(&self) -> Option<LastBuild> {
        self.last.read().await.clone()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Per-session target and destination
    pub sessions: Arc<SessionStore>,
    /// Build-and-deploy pipeline bound to the workspace
    pub pipeline: Pipeline,
    /// Board catalog served to clients
    pub boards: Arc<Vec<BoardProfile>>,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    pub stats: Arc<BuildStats>,
    pub start_time: Instant,
    pub ws_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: &FlashConfig) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(config.session_ttl())),
            pipeline: Pipeline::from_config(config),
            boards: Arc::new(config.boards.clone()),
            max_body_bytes: config.server.max_source_bytes,
            stats: Arc::new(BuildStats::default()),
            start_time: Instant::now(),
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to build events.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.pipeline.subscribe()
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Relaxed)
    }
}
