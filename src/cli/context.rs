//! Shared state for running CLI commands
//!
//! A one-shot command waits for any session watch it starts. The interactive
//! shell keeps watches running as numbered background jobs instead.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::client::{ClientError, SessionClient};
use crate::config::Config;
use crate::events::{EventBus, EventSubscription, PortalEvent};
use crate::poller::{PollOutcome, PollState};
use crate::portal::{Portal, SessionWatch};
use crate::session::Session;
use crate::session_types::SessionTypeMap;
use crate::task::TaskPoll;

use super::output::{OutputFormat, print_notice};

/// How long to wait for queued notices to print on exit
const PRINTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A session watch running in the shell
pub struct Job {
    pub number: usize,
    pub watch: SessionWatch,
    pub state: PollState,
}

impl Job {
    /// Record the outcome if the watch has finished
    fn reap(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        match self.watch.try_outcome() {
            TaskPoll::Complete(Ok(outcome)) => self.state = outcome.state(),
            TaskPoll::Complete(Err(e)) => {
                tracing::warn!("Job {} failed: {}", self.number, e);
                self.state = PollState::Failed;
            }
            TaskPoll::Pending | TaskPoll::Consumed => {}
        }
    }

    /// Recorded outcome, or the live state of a watch still running
    fn current_state(&self) -> PollState {
        if self.state.is_terminal() {
            self.state
        } else {
            self.watch.state()
        }
    }
}

pub struct CommandContext {
    pub format: OutputFormat,
    pub quiet: bool,
    bus: EventBus,
    portal: Option<Portal<SessionClient>>,
    banner: Option<String>,
    default_session_type: String,
    jobs: Option<Vec<Job>>,
    next_job: usize,
    printer: JoinHandle<()>,
}

impl CommandContext {
    /// Context for a single command run from the command line
    pub fn oneshot(format: OutputFormat, quiet: bool) -> Self {
        Self::new(format, quiet, None)
    }

    /// Context for the interactive shell
    pub fn interactive(format: OutputFormat, quiet: bool) -> Self {
        Self::new(format, quiet, Some(Vec::new()))
    }

    fn new(format: OutputFormat, quiet: bool, jobs: Option<Vec<Job>>) -> Self {
        let bus = EventBus::default();
        let printer = tokio::spawn(print_events(bus.subscribe(), quiet, jobs.is_some()));

        Self {
            format,
            quiet,
            bus,
            portal: None,
            banner: None,
            default_session_type: SessionTypeMap::load().default,
            jobs,
            next_job: 1,
            printer,
        }
    }

    /// Portal connected to the configured session service, created on first use
    pub fn portal(&mut self) -> Result<Portal<SessionClient>> {
        if self.portal.is_none() {
            let config = Config::load()?;
            let url = config.service_url()?;
            let client = SessionClient::new(&config.service, url)
                .context("Failed to set up session service client")?;
            let running = config
                .polling
                .running()
                .context("Invalid polling settings")?;
            let terminated = config
                .polling
                .terminated()
                .context("Invalid polling settings")?;

            tracing::debug!("Using session service at {}", client.endpoints().base());
            self.banner = config.portal.banner_text.clone();
            self.default_session_type = config.portal.default_session_type.clone();
            self.portal = Some(Portal::new(client, self.bus.clone(), running, terminated));
        }

        self.portal
            .clone()
            .context("Session service is not configured")
    }

    /// Configured banner message, if any
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref().filter(|b| !b.trim().is_empty())
    }

    /// Session type used when a launch doesn't name one
    pub fn default_session_type(&self) -> &str {
        &self.default_session_type
    }

    /// Wait for a watch, or in the shell, keep it as a background job.
    ///
    /// Returns the outcome when the watch was waited for.
    pub async fn follow(
        &mut self,
        watch: SessionWatch,
    ) -> Result<Option<PollOutcome<Vec<Session>, ClientError>>> {
        match self.jobs.as_mut() {
            Some(jobs) => {
                let number = self.next_job;
                self.next_job += 1;
                if !self.quiet {
                    println!("[{}] Watching {}", number, watch.label());
                }
                jobs.push(Job {
                    number,
                    watch,
                    state: PollState::Polling,
                });
                Ok(None)
            }
            None => {
                // Ctrl-C stops the watch rather than killing the process mid-request
                let cancel = watch.cancel_token();
                let outcome = watch.outcome();
                tokio::pin!(outcome);
                let outcome = tokio::select! {
                    result = &mut outcome => result?,
                    Ok(()) = tokio::signal::ctrl_c() => {
                        cancel.cancel();
                        outcome.await?
                    }
                };
                Ok(Some(outcome))
            }
        }
    }

    /// Collect outcomes of finished jobs and return every job's state
    pub fn jobs(&mut self) -> Vec<(usize, String, PollState)> {
        let Some(jobs) = self.jobs.as_mut() else {
            return Vec::new();
        };

        for job in jobs.iter_mut() {
            job.reap();
        }

        jobs.iter()
            .map(|j| (j.number, j.watch.label().to_string(), j.current_state()))
            .collect()
    }

    /// Cancel a background job by number. A job that already finished keeps its outcome.
    pub fn cancel_job(&mut self, number: usize) -> Result<()> {
        let job = self
            .jobs
            .as_mut()
            .and_then(|jobs| jobs.iter_mut().find(|j| j.number == number))
            .with_context(|| format!("No job [{}]", number))?;

        job.reap();
        if job.state.is_terminal() {
            anyhow::bail!("Job [{}] already finished ({})", number, job.state.description());
        }
        job.watch.cancel();
        Ok(())
    }

    /// Stop outstanding jobs and let queued notices print
    pub async fn finish(self) {
        let Self {
            bus,
            portal,
            jobs,
            printer,
            ..
        } = self;

        // Dropping the watches cancels them; the printer ends once every bus handle is gone
        drop(jobs);
        drop(portal);
        drop(bus);

        if tokio::time::timeout(PRINTER_DRAIN_TIMEOUT, printer).await.is_err() {
            tracing::debug!("Notice printer still busy at exit");
        }
    }
}

/// Print notices as they arrive. The shell also gets the connect URL of a
/// session once a background watch sees it running.
async fn print_events(mut events: EventSubscription, quiet: bool, interactive: bool) {
    while let Some(event) = events.recv().await {
        match event {
            PortalEvent::Notice(notice) => print_notice(&notice, quiet),
            PortalEvent::SessionRunning(Session {
                connect_url: Some(url),
                ..
            }) if interactive && !quiet => eprintln!("     {}", url),
            other => tracing::debug!("Event: {}", other.describe()),
        }
    }
}
