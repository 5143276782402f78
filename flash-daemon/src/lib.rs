//! Flash daemon library - HTTP surface over the build-and-deploy pipeline.
//!
//! This library provides:
//! - The axum router and its handlers
//! - Cookie-based session resolution
//! - Shared server state and build statistics

pub mod server;
