//! Flash core - build-and-deploy pipeline for editor-submitted firmware.
//!
//! This library provides:
//! - Per-session target/destination configuration
//! - Source intake into a build workspace
//! - Toolchain invocation with timeout and cancellation
//! - Artifact relocation onto a mounted device
//! - The pipeline that sequences them

pub mod boards;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod relocate;
pub mod session;
pub mod toolchain;
pub mod workspace;

pub use boards::BoardProfile;
pub use config::FlashConfig;
pub use error::{ConfigKey, ErrorKind, FlashError, Result};
pub use pipeline::{BuildEvent, BuildReport, BuildRequest, Pipeline, PipelineFailure, PipelineState, Stage};
pub use relocate::{ArtifactRelocator, Deployed};
pub use session::{SessionConfig, SessionId, SessionStore};
pub use toolchain::{Invocation, Toolchain};
pub use workspace::BuildWorkspace;
