//! HTTP server for the flash daemon.
//!
//! Provides REST API for:
//! - Session configuration (target board, destination path)
//! - Build-and-deploy requests
//! - Status, health and the board catalog
//! - Live build events over WebSocket

mod http;
pub mod session;
pub mod state;
mod websocket;

pub use http::create_router;
pub use session::{ClientSession, SESSION_COOKIE};
pub use state::{AppState, BuildStats, LastBuild};
