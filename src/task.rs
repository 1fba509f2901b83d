//! Background poll cycles
//!
//! Runs a poll cycle on the tokio runtime and hands back a [`PollHandle`] that can
//! cancel the cycle, check it without blocking, or await its outcome.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::poller::{PollOutcome, PollState};

/// Errors from waiting on a background poll cycle
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Poll outcome was already taken")]
    Consumed,

    #[error("Poll task failed: {0}")]
    Join(#[from] JoinError),
}

/// Result of checking a handle without blocking
pub enum TaskPoll<T, E> {
    /// Outcome was already taken by an earlier call
    Consumed,
    /// Cycle is still running
    Pending,
    /// Cycle finished (the join error covers a panicked or aborted task)
    Complete(Result<PollOutcome<T, E>, JoinError>),
}

/// Handle to a poll cycle running in the background.
///
/// Dropping the handle cancels the cycle.
pub struct PollHandle<T, E> {
    label: String,
    cancel: CancellationToken,
    finished: watch::Receiver<Option<PollState>>,
    task: Option<JoinHandle<PollOutcome<T, E>>>,
}

impl<T, E> PollHandle<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawn a future that resolves to a poll outcome.
    ///
    /// `cancel` must be the token the future polls with so that [`cancel`](Self::cancel)
    /// reaches it.
    pub fn spawn<Fut>(label: impl Into<String>, cancel: CancellationToken, future: Fut) -> Self
    where
        Fut: Future<Output = PollOutcome<T, E>> + Send + 'static,
    {
        let label = label.into();
        let span = tracing::info_span!("poll", target = %label);
        let (record, finished) = watch::channel(None);
        let task = tokio::spawn(
            async move {
                let outcome = future.await;
                record.send_replace(Some(outcome.state()));
                outcome
            }
            .instrument(span),
        );

        Self {
            label,
            cancel,
            finished,
            task: Some(task),
        }
    }
}

impl<T, E> PollHandle<T, E> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stop the cycle; no further fetch will be issued
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// State for display. Once the cycle has finished this is the state of its
    /// outcome, even if the outcome hasn't been taken or a cancel came later.
    pub fn state(&self) -> PollState {
        if let Some(state) = *self.finished.borrow() {
            state
        } else if self.cancel.is_cancelled() {
            PollState::Cancelled
        } else {
            PollState::Polling
        }
    }

    /// Check whether the cycle has finished and take its outcome if so.
    ///
    /// # Example
    /// ```ignore
    /// match handle.try_outcome() {
    ///     TaskPoll::Complete(Ok(PollOutcome::Success(sessions))) => { /* done */ }
    ///     TaskPoll::Complete(Ok(other)) => { /* timed out, failed, cancelled */ }
    ///     TaskPoll::Complete(Err(e)) => { /* task panicked */ }
    ///     TaskPoll::Pending => {}
    ///     TaskPoll::Consumed => {}
    /// }
    /// ```
    pub fn try_outcome(&mut self) -> TaskPoll<T, E> {
        let Some(task) = self.task.as_mut() else {
            return TaskPoll::Consumed;
        };

        if !task.is_finished() {
            return TaskPoll::Pending;
        }

        match task.now_or_never() {
            Some(result) => {
                self.task = None;
                TaskPoll::Complete(result)
            }
            None => {
                // Shouldn't happen since we checked is_finished()
                tracing::warn!("Poll task not ready despite is_finished()");
                TaskPoll::Pending
            }
        }
    }

    /// Wait for the cycle to finish.
    pub async fn outcome(mut self) -> Result<PollOutcome<T, E>, TaskError> {
        let task = self.task.take().ok_or(TaskError::Consumed)?;
        Ok(task.await?)
    }
}

impl<T, E> fmt::Debug for PollHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHandle")
            .field("label", &self.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T, E> Drop for PollHandle<T, E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
