//! Portal workflows.
//!
//! This module handles:
//! - Checking for the user's sessions
//! - Requesting a new session and watching it start
//! - Deleting a session and watching it leave the list
//! - Connecting to a running session
//! - Loading launch form choices (context resources and images)
//!
//! Every step reports through the [`EventBus`]; the watch steps run in the
//! background and hand back a [`PollHandle`] so several can be in flight at once.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, SessionService};
use crate::events::{EventBus, Notice, PortalEvent};
use crate::poller::{PollOutcome, PollSettings};
use crate::session::{LaunchError, LaunchOptions, LaunchRequest, Session, SessionIdentity};
use crate::task::PollHandle;
use crate::watch::{self, WaitTarget};

/// Handle to a background session watch
pub type SessionWatch = PollHandle<Vec<Session>, ClientError>;

/// Errors from portal workflows
#[derive(Error, Debug)]
pub enum PortalError {
    #[error(transparent)]
    Service(#[from] ClientError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("No session matches {0}")]
    SessionNotFound(String),

    #[error("Session {name} ({id}) is not running ({status})")]
    NotRunning {
        id: String,
        name: String,
        status: String,
    },

    #[error("Session {0} is running but has no connect URL")]
    NoConnectUrl(String),

    #[error("No container images found for {0} sessions")]
    NoImages(String),
}

/// Portal controller over a session service
#[derive(Clone)]
pub struct Portal<S> {
    service: S,
    bus: EventBus,
    running: PollSettings,
    terminated: PollSettings,
}

impl<S: SessionService> Portal<S> {
    pub fn new(service: S, bus: EventBus, running: PollSettings, terminated: PollSettings) -> Self {
        Self {
            service,
            bus,
            running,
            terminated,
        }
    }

    #[cfg(test)]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Fetch the session list and publish it.
    pub async fn check_for_sessions(&self) -> Result<Vec<Session>, PortalError> {
        self.bus
            .notify(Notice::busy("Session Check", "Checking for active sessions"));

        match self.service.list_sessions().await {
            Ok(sessions) => {
                tracing::debug!("Session list has {} entries", sessions.len());
                self.bus
                    .publish(PortalEvent::SessionListLoaded(sessions.clone()));
                Ok(sessions)
            }
            Err(e) => {
                self.report_list_failure(&e);
                Err(e.into())
            }
        }
    }

    fn report_list_failure(&self, error: &ClientError) {
        tracing::warn!("Unable to load session list: {}", error);
        self.bus.publish(PortalEvent::SessionListFailed {
            message: error.to_string(),
            forbidden: error.is_forbidden(),
        });

        if error.is_forbidden() {
            // No access to session resources: point at getting an allocation
            self.bus.notify(Notice::error(
                "Session service authorization issue",
                format!(
                    "{}. Your account may not have access to session resources; \
                     contact your portal administrator to request an allocation.",
                    error
                ),
            ));
        } else {
            self.bus.notify(
                Notice::error(
                    "Session service unavailable",
                    format!("Unable to load the session list: {}", error),
                )
                .with_reload(),
            );
        }
    }

    /// Load the choices for the launch form for one session type.
    pub async fn load_launch_options(&self, session_type: &str) -> Result<LaunchOptions, PortalError> {
        self.bus.notify(Notice::busy(
            "Loading Launch Options",
            "Getting context resources and container images",
        ));

        let (context, images) = futures::join!(
            self.service.context(),
            self.service.list_images(Some(session_type))
        );

        let context = context.inspect_err(|e| {
            self.bus.notify(
                Notice::error(
                    "Problem Loading Context",
                    format!("Problem loading server context resources: {}", e),
                )
                .with_reload(),
            );
        })?;
        let images = images.inspect_err(|e| {
            self.bus.notify(
                Notice::error(
                    "Problem loading container images",
                    format!("Problem loading container image list: {}", e),
                )
                .with_reload(),
            );
        })?;

        if images.is_empty() {
            self.bus.notify(Notice::error(
                "No Images found",
                format!("No container images found for {} sessions.", session_type),
            ));
            return Err(PortalError::NoImages(session_type.to_string()));
        }

        Ok(LaunchOptions::new(session_type, &context, &images))
    }

    /// Request a new session and start watching for it to run.
    pub async fn request_session(&self, request: LaunchRequest) -> Result<SessionWatch, PortalError> {
        let request = request.validate()?;
        self.bus.notify(Notice::busy(
            "Requesting Session",
            format!("Requesting new {} session {}", request.session_type, request.name),
        ));

        if let Err(e) = self.service.create_session(&request).await {
            tracing::warn!("Session request failed: {}", e);
            self.bus
                .publish(PortalEvent::SessionRequestFailed(e.to_string()));
            self.bus.notify(Notice::error(
                "Session request failed",
                format!("Unable to request session {}: {}", request.name, e),
            ));
            return Err(e.into());
        }

        let identity = request.identity();
        self.bus
            .publish(PortalEvent::SessionRequested(identity.clone()));
        Ok(self.watch_session(identity, WaitTarget::Running))
    }

    /// Delete a session and start watching for it to leave the list.
    pub async fn delete_session(&self, id: &str) -> Result<SessionWatch, PortalError> {
        self.bus
            .notify(Notice::busy("Delete Request", format!("Deleting session {}", id)));

        if let Err(e) = self.service.delete_session(id).await {
            tracing::warn!("Delete of {} failed: {}", id, e);
            self.bus.notify(Notice::error(
                "Delete request failed",
                format!("Unable to delete session {}: {}", id, e),
            ));
            return Err(e.into());
        }

        self.bus
            .publish(PortalEvent::SessionDeleteRequested(id.to_string()));
        self.bus.notify(Notice::busy(
            "Polling",
            "Waiting for session delete request to complete.",
        ));
        Ok(self.watch_session(SessionIdentity::id(id), WaitTarget::Terminated))
    }

    /// Watch a session in the background and report the outcome on the bus.
    pub fn watch_session(&self, identity: SessionIdentity, target: WaitTarget) -> SessionWatch {
        let settings = match target {
            WaitTarget::Running => self.running,
            WaitTarget::Terminated => self.terminated,
        };
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let portal = self.clone();
        let label = format!("{} {}", target.description(), identity);

        PollHandle::spawn(label, cancel, async move {
            let outcome = match target {
                WaitTarget::Running => {
                    watch::poll_until_running(&portal.service, &identity, settings, &token).await
                }
                WaitTarget::Terminated => {
                    watch::poll_until_terminated(&portal.service, &identity, settings, &token).await
                }
            };
            portal.report_watch(&identity, target, &outcome);
            outcome
        })
    }

    fn report_watch(
        &self,
        identity: &SessionIdentity,
        target: WaitTarget,
        outcome: &PollOutcome<Vec<Session>, ClientError>,
    ) {
        match (target, outcome) {
            (WaitTarget::Running, PollOutcome::Success(sessions)) => {
                if let Some(session) = identity.find_running(sessions) {
                    tracing::info!("Session {} ({}) is running", session.name, session.id);
                    self.bus
                        .publish(PortalEvent::SessionRunning(session.clone()));
                    self.bus.notify(Notice::success(
                        "Session Running",
                        format!("Session {} ({}) is ready to connect", session.name, session.id),
                    ));
                }
                self.bus
                    .publish(PortalEvent::SessionListLoaded(sessions.clone()));
            }
            (WaitTarget::Terminated, PollOutcome::Success(sessions)) => {
                tracing::info!("Session {} is gone", identity);
                if let SessionIdentity::Id { id } = identity {
                    self.bus.publish(PortalEvent::SessionTerminated(id.clone()));
                }
                self.bus.notify(Notice::success(
                    "Done",
                    "Session deleted, refreshing session list.",
                ));
                self.bus
                    .publish(PortalEvent::SessionListLoaded(sessions.clone()));
            }
            (WaitTarget::Running, PollOutcome::TimedOut) => {
                tracing::warn!("Gave up waiting for {} to start", identity);
                self.bus.notify(
                    Notice::error(
                        "Session not running yet",
                        format!(
                            "Session {} is taking a while to start. \
                             Reload the session list to check again.",
                            identity
                        ),
                    )
                    .with_reload(),
                );
            }
            (WaitTarget::Terminated, PollOutcome::TimedOut) => {
                tracing::warn!("Gave up waiting for {} to terminate", identity);
                self.bus.notify(
                    Notice::error(
                        "Session delete pending",
                        "The session is taking a while to terminate. \
                         Reload the session list to refresh it.",
                    )
                    .with_reload(),
                );
            }
            (_, PollOutcome::Failed(e)) => {
                tracing::warn!("Watching {} failed: {}", identity, e);
                self.bus.publish(PortalEvent::SessionListFailed {
                    message: e.to_string(),
                    forbidden: e.is_forbidden(),
                });
                self.bus.notify(
                    Notice::error(
                        "Error checking for sessions",
                        format!(
                            "Unable to get session list ({}). Reload to try again, \
                             or contact your portal administrator for assistance.",
                            e
                        ),
                    )
                    .with_reload(),
                );
            }
            (_, PollOutcome::Cancelled) => {
                tracing::debug!("Stopped watching {}", identity);
            }
        }
    }

    /// Find a running session to connect to.
    ///
    /// `key` may be a session id or name. The caller opens the returned URL.
    pub async fn connect(&self, key: &str) -> Result<(Session, String), PortalError> {
        let sessions = self.service.list_sessions().await.inspect_err(|e| {
            self.report_list_failure(e);
        })?;

        let session = sessions
            .iter()
            .find(|s| s.id == key)
            .or_else(|| sessions.iter().find(|s| s.name == key))
            .ok_or_else(|| PortalError::SessionNotFound(key.to_string()))?;

        if !session.is_running() {
            self.bus.notify(Notice::error(
                "Can't connect to session",
                format!(
                    "Session {} was found, but is not running ({}). Try again in a few moments.",
                    session.name, session.status
                ),
            ));
            return Err(PortalError::NotRunning {
                id: session.id.clone(),
                name: session.name.clone(),
                status: session.status.to_string(),
            });
        }

        let url = session
            .connect_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PortalError::NoConnectUrl(session.id.clone()))?;

        self.bus.notify(Notice::info(
            "Connecting to Session",
            format!("Connecting to existing session {} ({})", session.name, session.id),
        ));
        Ok((session.clone(), url))
    }
}
