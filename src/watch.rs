//! Session state watchers.
//!
//! Both watchers poll the session list and resolve with the list that
//! satisfied the condition, so callers can redraw without fetching again.

use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, SessionSource};
use crate::poller::{PollOutcome, PollRequest, PollSettings};
use crate::session::{Session, SessionIdentity};

/// Condition a watcher waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WaitTarget {
    /// A session with the identity is listed as Running
    Running,
    /// No session with the identity is listed
    Terminated,
}

impl WaitTarget {
    pub fn is_met(&self, identity: &SessionIdentity, sessions: &[Session]) -> bool {
        match self {
            WaitTarget::Running => identity.find_running(sessions).is_some(),
            WaitTarget::Terminated => !identity.is_present(sessions),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WaitTarget::Running => "running",
            WaitTarget::Terminated => "terminated",
        }
    }
}

/// Poll the session list until `target` holds for `identity`.
pub async fn poll_session<S: SessionSource>(
    source: &S,
    identity: &SessionIdentity,
    target: WaitTarget,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> PollOutcome<Vec<Session>, ClientError> {
    tracing::debug!(
        "Waiting up to {:?} for {} to be {} ({} attempts, {:?} apart)",
        settings.budget(),
        identity,
        target.description(),
        settings.max_attempts(),
        settings.interval()
    );

    let request = PollRequest::new(
        move || source.list_sessions(),
        move |sessions: &Vec<Session>| target.is_met(identity, sessions),
        settings,
    );
    request.run(cancel).await
}

/// Wait for a session to reach Running.
pub async fn poll_until_running<S: SessionSource>(
    source: &S,
    identity: &SessionIdentity,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> PollOutcome<Vec<Session>, ClientError> {
    poll_session(source, identity, WaitTarget::Running, settings, cancel).await
}

/// Wait for a session to disappear from the list.
pub async fn poll_until_terminated<S: SessionSource>(
    source: &S,
    identity: &SessionIdentity,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> PollOutcome<Vec<Session>, ClientError> {
    poll_session(source, identity, WaitTarget::Terminated, settings, cancel).await
}
