//! Session service client.
//!
//! This module provides:
//!
//! - `SessionClient`: HTTP client for the session service, carrying the configured
//!   credentials on every request
//! - `Endpoints`: URLs derived from the configured service base URL
//! - `SessionSource` and `SessionService`: the operations the portal needs, so
//!   workflows can run against the HTTP client or an in-memory stand-in
//!
//! Non-2xx responses become `ClientError::Status` with the response body as the
//! message. A 403 means the account has no access to session resources.

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::session::{Context, Image, LaunchRequest, Session};

/// User agent for API requests
const USER_AGENT: &str = concat!("science-portal/", env!("CARGO_PKG_VERSION"));

/// Errors from talking to the session service
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid service URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid credential for {0} header")]
    InvalidCredential(&'static str),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{}", status_text(*status, message))]
    Status { status: u16, message: String },

    #[error("Unexpected response from session service: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status code, if the service answered with an error status
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }
}

/// Describe an error status for display
fn status_text(status: u16, message: &str) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown error");
    let message = message.trim();

    if message.is_empty() {
        format!("{} ({})", reason, status)
    } else {
        format!("{} ({})", message, status)
    }
}

/// URLs of the session service endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn parse(base: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: base.to_string(),
            reason,
        };

        let url = Url::parse(base.trim().trim_end_matches('/')).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("expected an http(s) URL".to_string()));
        }

        Ok(Self { base: url })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn with_segments(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in parse(): base URLs always have a path
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Session list and creation
    pub fn sessions(&self) -> Url {
        self.with_segments(&["session"])
    }

    /// A single session
    pub fn session(&self, id: &str) -> Url {
        self.with_segments(&["session", id])
    }

    /// Container images, optionally for one session type
    pub fn images(&self, session_type: Option<&str>) -> Url {
        let mut url = self.with_segments(&["image"]);
        if let Some(session_type) = session_type {
            url.query_pairs_mut().append_pair("type", session_type);
        }
        url
    }

    /// Compute resources on offer
    pub fn context(&self) -> Url {
        self.with_segments(&["context"])
    }
}

/// Anything that can list the current user's sessions
pub trait SessionSource: Clone + Send + Sync + 'static {
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<Session>, ClientError>> + Send;
}

/// The full set of session service operations used by the portal
pub trait SessionService: SessionSource {
    fn create_session(
        &self,
        request: &LaunchRequest,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn delete_session(&self, id: &str) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn list_images(
        &self,
        session_type: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Image>, ClientError>> + Send;

    fn context(&self) -> impl Future<Output = Result<Context, ClientError>> + Send;
}

/// Session service HTTP client
#[derive(Clone)]
pub struct SessionClient {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl SessionClient {
    /// Create a client for the configured service.
    ///
    /// The bearer token and cookie, when set, are attached to every request.
    pub fn new(config: &ServiceConfig, service_url: &str) -> Result<Self, ClientError> {
        let endpoints = Endpoints::parse(service_url)?;

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ClientError::InvalidCredential("Authorization"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(cookie) = config.cookie.as_deref().filter(|c| !c.is_empty()) {
            let mut value =
                HeaderValue::from_str(cookie).map_err(|_| ClientError::InvalidCredential("Cookie"))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Turn an error status into `ClientError::Status`, passing success through
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let start = std::time::Instant::now();
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body = response.text().await?;

        tracing::debug!(
            "GET {} answered in {:.1}s",
            url,
            start.elapsed().as_secs_f32()
        );
        Ok(serde_json::from_str(&body)?)
    }
}

impl SessionSource for SessionClient {
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        let sessions: Vec<Session> = self.get_json(self.endpoints.sessions()).await?;
        tracing::debug!("Fetched {} sessions", sessions.len());
        Ok(sessions)
    }
}

impl SessionService for SessionClient {
    async fn create_session(&self, request: &LaunchRequest) -> Result<(), ClientError> {
        tracing::info!(
            "Requesting {} session {} with image {}",
            request.session_type,
            request.name,
            request.image
        );

        let response = self
            .client
            .post(self.endpoints.sessions())
            .form(request)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), ClientError> {
        tracing::info!("Deleting session {}", id);

        let response = self.client.delete(self.endpoints.session(id)).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn list_images(&self, session_type: Option<&str>) -> Result<Vec<Image>, ClientError> {
        let images: Vec<Image> = self.get_json(self.endpoints.images(session_type)).await?;
        tracing::debug!(
            "Fetched {} images for {}",
            images.len(),
            session_type.unwrap_or("all types")
        );
        Ok(images)
    }

    async fn context(&self) -> Result<Context, ClientError> {
        self.get_json(self.endpoints.context()).await
    }
}
