//! HTTP client for the flash daemon.
//!
//! Keeps a cookie store so every call made through one [`FlashClient`]
//! shares a single daemon session.

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;

/// Default daemon address.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

/// A board from the daemon's catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
}

/// Structured failure returned by `/build`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildFailure {
    pub error: String,
    pub build_id: String,
    pub stage: String,
    pub kind: String,
    pub log_tail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
    error: Option<String>,
}

pub struct FlashClient {
    base: String,
    http: reqwest::Client,
}

impl FlashClient {
    pub fn new(server: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            base: server.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post_form(&self, path: &str, field: &str, value: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url(path))
            .form(&[(field, value)])
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {}", self.base))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!("{} returned {}: {}", path, status, body);
        }
        Ok(body)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response: ApiResponse<T> = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {}", self.base))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("Invalid response from {}", path))?;

        match response.data {
            Some(data) => Ok(data),
            None => bail!(response.error.unwrap_or_else(|| "empty response".to_string())),
        }
    }

    /// Select the target board for this session.
    pub async fn select_target(&self, target: &str) -> Result<String> {
        self.post_form("/target", "target", target).await
    }

    /// Set the destination path for this session.
    pub async fn set_destination(&self, destination: &str) -> Result<String> {
        self.post_form("/destination", "destination", destination).await
    }

    /// Submit source and wait for the build to finish.
    ///
    /// `Ok(Err(_))` is a build that ran and failed; `Err(_)` is a transport
    /// or protocol problem.
    pub async fn build(&self, source: &str) -> Result<std::result::Result<(), BuildFailure>> {
        let response = self
            .http
            .post(self.url("/build"))
            .form(&[("source", source)])
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {}", self.base))?;

        match response.status() {
            StatusCode::OK => Ok(Ok(())),
            StatusCode::CONFLICT
            | StatusCode::UNPROCESSABLE_ENTITY
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR => {
                let failure = response
                    .json::<BuildFailure>()
                    .await
                    .context("Invalid build failure response")?;
                Ok(Err(failure))
            }
            status => bail!("/build returned {}: {}", status, response.text().await?),
        }
    }

    pub async fn boards(&self) -> Result<Vec<Board>> {
        self.get_json("/boards").await
    }

    pub async fn status(&self) -> Result<serde_json::Value> {
        self.get_json("/status").await
    }
}
