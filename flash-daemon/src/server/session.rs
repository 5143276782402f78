//! Session cookie handling.
//!
//! Clients carry their [`SessionId`] in the `flash_session` cookie. Requests
//! whose cookie does not name a live session get a fresh id, returned via
//! `Set-Cookie`. Ids are only ever issued by the server.

use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use flash_core::{SessionId, SessionStore};

pub const SESSION_COOKIE: &str = "flash_session";

/// Session resolved for one request.
#[derive(Debug, Clone, Copy)]
pub struct ClientSession {
    pub id: SessionId,
    /// Minted for this request; the client has not seen it yet.
    pub fresh: bool,
}

impl ClientSession {
    /// Resolve the caller's session, minting a new one unless the cookie
    /// names a session the store still holds.
    pub async fn resolve(headers: &HeaderMap, sessions: &SessionStore) -> Self {
        if let Some(id) = session_cookie(headers) {
            if sessions.contains(id).await {
                return Self { id, fresh: false };
            }
            debug!("Ignoring cookie for unknown session {}", id);
        }
        Self {
            id: SessionId::new(),
            fresh: true,
        }
    }

    /// Attach `Set-Cookie` when the session is new.
    pub fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.fresh {
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| value.trim().parse().ok())
}
