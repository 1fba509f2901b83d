//! Session service data model.
//!
//! This module provides:
//!
//! - `Session` and `SessionStatus`: records returned by the session list endpoint
//! - `SessionIdentity`: how a session is recognised in a list (by id, or by the
//!   name and type posted when it was requested)
//! - `Context` and `Image`: resources offered on the launch form
//! - `LaunchRequest` and `LaunchOptions`: the launch form and its choices

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status reported by the session service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    Pending,
    Running,
    Terminating,
    Succeeded,
    Failed,
    Error,
    /// Any status this client doesn't know about, kept verbatim
    Other(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Pending => "Pending",
            SessionStatus::Running => "Running",
            SessionStatus::Terminating => "Terminating",
            SessionStatus::Succeeded => "Succeeded",
            SessionStatus::Failed => "Failed",
            SessionStatus::Error => "Error",
            SessionStatus::Other(s) => s,
        }
    }
}

impl From<String> for SessionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => SessionStatus::Pending,
            "Running" => SessionStatus::Running,
            "Terminating" => SessionStatus::Terminating,
            "Succeeded" => SessionStatus::Succeeded,
            "Failed" => SessionStatus::Failed,
            "Error" => SessionStatus::Error,
            _ => SessionStatus::Other(value),
        }
    }
}

impl From<SessionStatus> for String {
    fn from(value: SessionStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session as listed by the session service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub session_type: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(rename = "connectURL", default)]
    pub connect_url: Option<String>,
}

impl Session {
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Parse the start time, if the service reported one in RFC 3339 form
    pub fn started_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.start_time.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc))
    }
}

/// How to find a session in a session list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", rename_all = "lowercase")]
pub enum SessionIdentity {
    /// Service-assigned identifier
    Id { id: String },
    /// Name and type from the launch form. Creating a session doesn't return its
    /// id, so a new session is tracked this way until it shows up in the list.
    Name {
        name: String,
        #[serde(rename = "type")]
        session_type: String,
    },
}

impl SessionIdentity {
    pub fn id(id: impl Into<String>) -> Self {
        SessionIdentity::Id { id: id.into() }
    }

    pub fn name(name: impl Into<String>, session_type: impl Into<String>) -> Self {
        SessionIdentity::Name {
            name: name.into(),
            session_type: session_type.into(),
        }
    }

    pub fn matches(&self, session: &Session) -> bool {
        match self {
            SessionIdentity::Id { id } => session.id == *id,
            SessionIdentity::Name { name, session_type } => {
                session.name == *name && session.session_type.eq_ignore_ascii_case(session_type)
            }
        }
    }

    /// First session in the list with this identity
    pub fn find<'a>(&self, sessions: &'a [Session]) -> Option<&'a Session> {
        sessions.iter().find(|s| self.matches(s))
    }

    /// First running session in the list with this identity.
    ///
    /// A name can briefly match both an old terminating session and the new one.
    pub fn find_running<'a>(&self, sessions: &'a [Session]) -> Option<&'a Session> {
        sessions.iter().find(|s| self.matches(s) && s.is_running())
    }

    pub fn is_present(&self, sessions: &[Session]) -> bool {
        self.find(sessions).is_some()
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionIdentity::Id { id } => write!(f, "id {}", id),
            SessionIdentity::Name { name, session_type } => write!(f, "{} ({})", name, session_type),
        }
    }
}

/// Compute resources the service currently offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default)]
    pub available_cores: Vec<u32>,
    #[serde(default)]
    pub default_cores: Option<u32>,
    #[serde(rename = "availableRAM", default)]
    pub available_ram: Vec<u32>,
    #[serde(rename = "defaultRAM", default)]
    pub default_ram: Option<u32>,
}

/// A container image that can back a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

/// Errors in a launch form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Session name is required")]
    MissingName,

    #[error("Session type is required")]
    MissingType,

    #[error("Container image is required")]
    MissingImage,

    #[error("{field} {value} is not offered (choose from: {choices})")]
    Unavailable {
        field: &'static str,
        value: String,
        choices: String,
    },
}

/// Session launch form, posted as form fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub session_type: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram: Option<u32>,
}

impl LaunchRequest {
    /// Check required fields, trimming surrounding whitespace
    pub fn validate(mut self) -> Result<Self, LaunchError> {
        self.name = self.name.trim().to_string();
        self.session_type = self.session_type.trim().to_string();
        self.image = self.image.trim().to_string();

        if self.name.is_empty() {
            return Err(LaunchError::MissingName);
        }
        if self.session_type.is_empty() {
            return Err(LaunchError::MissingType);
        }
        if self.image.is_empty() {
            return Err(LaunchError::MissingImage);
        }
        Ok(self)
    }

    /// Identity the new session will be tracked by
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity::name(&self.name, &self.session_type)
    }
}

/// Choices for the launch form, built from the context and image list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchOptions {
    pub session_type: String,
    pub cores: Vec<u32>,
    pub default_cores: Option<u32>,
    pub ram: Vec<u32>,
    pub default_ram: Option<u32>,
    pub images: Vec<String>,
}

impl LaunchOptions {
    pub fn new(session_type: &str, context: &Context, images: &[Image]) -> Self {
        Self {
            session_type: session_type.to_string(),
            cores: context.available_cores.clone(),
            default_cores: context.default_cores,
            ram: context.available_ram.clone(),
            default_ram: context.default_ram,
            images: images.iter().map(|i| i.id.clone()).collect(),
        }
    }

    /// The first listed image is the default
    pub fn default_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Fill a launch request from user choices, falling back to the defaults.
    pub fn fill(
        &self,
        name: &str,
        image: Option<&str>,
        cores: Option<u32>,
        ram: Option<u32>,
    ) -> Result<LaunchRequest, LaunchError> {
        let image = match image {
            Some(image) => {
                if !self.images.iter().any(|i| i == image) {
                    return Err(LaunchError::Unavailable {
                        field: "Image",
                        value: image.to_string(),
                        choices: self.images.join(", "),
                    });
                }
                image.to_string()
            }
            None => self.default_image().ok_or(LaunchError::MissingImage)?.to_string(),
        };

        let cores = pick("Cores", cores, &self.cores, self.default_cores)?;
        let ram = pick("RAM", ram, &self.ram, self.default_ram)?;

        LaunchRequest {
            name: name.to_string(),
            session_type: self.session_type.clone(),
            image,
            cores,
            ram,
        }
        .validate()
    }
}

fn pick(
    field: &'static str,
    chosen: Option<u32>,
    available: &[u32],
    default: Option<u32>,
) -> Result<Option<u32>, LaunchError> {
    match chosen {
        Some(value) if !available.is_empty() && !available.contains(&value) => {
            Err(LaunchError::Unavailable {
                field,
                value: value.to_string(),
                choices: available
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        }
        Some(value) => Ok(Some(value)),
        None => Ok(default),
    }
}
