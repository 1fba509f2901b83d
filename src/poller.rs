//! Fixed-interval condition polling.
//!
//! A poll cycle repeatedly calls a caller-supplied fetch operation and checks
//! the result with a predicate:
//!
//! - The first fetch happens immediately
//! - Fetches are strictly sequential, separated by the configured interval
//! - A fetch error ends the cycle at once (only "not yet" is retried)
//! - The cycle ends as `TimedOut` after `max_attempts` unsuccessful fetches
//!
//! Cancellation goes through a [`CancellationToken`]; once it fires no further
//! fetch is started and the cycle resolves as `Cancelled`.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised when building poll settings
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollConfigError {
    #[error("Poll interval must be greater than zero")]
    ZeroInterval,

    #[error("Poll attempt limit must be at least 1")]
    ZeroAttempts,
}

/// Cadence and budget of a poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    interval: Duration,
    max_attempts: u32,
}

impl PollSettings {
    /// Create settings from an interval and a total fetch budget
    pub fn new(interval: Duration, max_attempts: u32) -> Result<Self, PollConfigError> {
        if interval.is_zero() {
            return Err(PollConfigError::ZeroInterval);
        }
        if max_attempts == 0 {
            return Err(PollConfigError::ZeroAttempts);
        }
        Ok(Self { interval, max_attempts })
    }

    /// Create settings that give up after roughly `timeout`.
    ///
    /// The attempt budget is `ceil(timeout / interval)`, never less than one,
    /// so a zero timeout still performs a single fetch.
    pub fn from_timeout(interval: Duration, timeout: Duration) -> Result<Self, PollConfigError> {
        if interval.is_zero() {
            return Err(PollConfigError::ZeroInterval);
        }
        let attempts = timeout.as_millis().div_ceil(interval.as_millis().max(1));
        let attempts = u32::try_from(attempts).unwrap_or(u32::MAX).max(1);
        Self::new(interval, attempts)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Total waiting budget (`interval * max_attempts`)
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// A fetch operation, a completion predicate and the settings to drive them.
///
/// The request is consumed by a single poll cycle.
pub struct PollRequest<F, P> {
    fetch: F,
    predicate: P,
    settings: PollSettings,
}

impl<F, P> PollRequest<F, P> {
    pub fn new(fetch: F, predicate: P, settings: PollSettings) -> Self {
        Self {
            fetch,
            predicate,
            settings,
        }
    }

    /// Run the poll cycle to completion.
    pub async fn run<Fut, T, E>(self, cancel: &CancellationToken) -> PollOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
    {
        poll_condition(self, cancel).await
    }
}

/// Where a poll cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Succeeded,
    TimedOut,
    Failed,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }

    /// Get a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            PollState::Polling => "Polling",
            PollState::Succeeded => "Done",
            PollState::TimedOut => "Timed out",
            PollState::Failed => "Failed",
            PollState::Cancelled => "Cancelled",
        }
    }
}

/// Terminal result of a poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T, E> {
    /// The predicate accepted this fetched value
    Success(T),
    /// Every attempt was used without the predicate accepting a value
    TimedOut,
    /// The fetch operation itself failed
    Failed(E),
    /// The caller withdrew interest before the cycle finished
    Cancelled,
}

impl<T, E> PollOutcome<T, E> {
    pub fn state(&self) -> PollState {
        match self {
            PollOutcome::Success(_) => PollState::Succeeded,
            PollOutcome::TimedOut => PollState::TimedOut,
            PollOutcome::Failed(_) => PollState::Failed,
            PollOutcome::Cancelled => PollState::Cancelled,
        }
    }

    pub fn into_result(self) -> Result<T, PollError<E>> {
        match self {
            PollOutcome::Success(value) => Ok(value),
            PollOutcome::TimedOut => Err(PollError::Exhausted),
            PollOutcome::Failed(e) => Err(PollError::Transport(e)),
            PollOutcome::Cancelled => Err(PollError::Cancelled),
        }
    }
}

/// Failed poll outcomes as an error type
#[derive(Error, Debug)]
pub enum PollError<E> {
    #[error("{0}")]
    Transport(E),

    #[error("Condition not met within the polling window")]
    Exhausted,

    #[error("Polling cancelled")]
    Cancelled,
}

/// Drive one poll cycle until success, exhaustion, fetch failure or cancellation.
pub async fn poll_condition<F, Fut, P, T, E>(
    request: PollRequest<F, P>,
    cancel: &CancellationToken,
) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let PollRequest {
        mut fetch,
        predicate,
        settings,
    } = request;
    let mut attempt: u32 = 1;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(attempt, "Poll cancelled before fetch");
            return PollOutcome::Cancelled;
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(attempt, "Poll cancelled during fetch");
                return PollOutcome::Cancelled;
            }
            result = fetch() => result,
        };

        let value = match fetched {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(attempt, "Poll fetch failed");
                return PollOutcome::Failed(e);
            }
        };

        // Checked before the budget so the last attempt can still succeed
        if predicate(&value) {
            tracing::debug!(attempt, "Poll condition met");
            return PollOutcome::Success(value);
        }

        if attempt >= settings.max_attempts {
            tracing::debug!(attempt, "Poll attempts exhausted");
            return PollOutcome::TimedOut;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(attempt, "Poll cancelled while waiting");
                return PollOutcome::Cancelled;
            }
            _ = tokio::time::sleep(settings.interval) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Status(&'static str);

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct HttpStatus(u16);

    fn settings(interval_ms: u64, max_attempts: u32) -> PollSettings {
        PollSettings::new(Duration::from_millis(interval_ms), max_attempts).unwrap()
    }

    /// Fetch that answers from a script and counts calls; the last entry repeats.
    fn scripted(
        script: Vec<Result<Status, HttpStatus>>,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<Status, HttpStatus>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let step = script.get(n).or(script.last()).cloned().unwrap();
            std::future::ready(step)
        }
    }

    fn is_running(status: &Status) -> bool {
        status.0 == "Running"
    }

    #[test]
    fn test_settings_validation() {
        assert_eq!(
            PollSettings::new(Duration::ZERO, 3),
            Err(PollConfigError::ZeroInterval)
        );
        assert_eq!(
            PollSettings::new(Duration::from_millis(10), 0),
            Err(PollConfigError::ZeroAttempts)
        );
        assert!(PollSettings::new(Duration::from_millis(10), 1).is_ok());
    }

    #[test]
    fn test_settings_from_timeout() {
        let s = PollSettings::from_timeout(Duration::from_millis(200), Duration::from_millis(10_000))
            .unwrap();
        assert_eq!(s.max_attempts(), 50);
        assert_eq!(s.budget(), Duration::from_millis(10_000));

        // Partial intervals round up
        let s = PollSettings::from_timeout(Duration::from_millis(300), Duration::from_millis(1000))
            .unwrap();
        assert_eq!(s.max_attempts(), 4);

        // Zero timeout still allows one fetch
        let s = PollSettings::from_timeout(Duration::from_millis(300), Duration::ZERO).unwrap();
        assert_eq!(s.max_attempts(), 1);

        assert_eq!(
            PollSettings::from_timeout(Duration::ZERO, Duration::from_secs(1)),
            Err(PollConfigError::ZeroInterval)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_fetch() {
        for (interval_ms, max_attempts) in [(1, 1), (10, 5), (5000, 100)] {
            let calls = Arc::new(AtomicU32::new(0));
            let request = PollRequest::new(
                scripted(vec![Ok(Status("Running"))], calls.clone()),
                is_running,
                settings(interval_ms, max_attempts),
            );

            let start = Instant::now();
            let outcome = request.run(&CancellationToken::new()).await;

            assert_eq!(outcome, PollOutcome::Success(Status("Running")));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_fetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let request = PollRequest::new(
            scripted(
                vec![
                    Ok(Status("Pending")),
                    Ok(Status("Pending")),
                    Ok(Status("Running")),
                ],
                calls.clone(),
            ),
            is_running,
            settings(10, 5),
        );

        let start = Instant::now();
        let outcome = request.run(&CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::Success(Status("Running")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let request = PollRequest::new(
            scripted(vec![Ok(Status("Pending"))], calls.clone()),
            is_running,
            settings(10, 3),
        );

        let start = Instant::now();
        let outcome = request.run(&CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two waits between three fetches, none after the last one
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_wins_on_last_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let request = PollRequest::new(
            scripted(
                vec![Ok(Status("Pending")), Ok(Status("Running"))],
                calls.clone(),
            ),
            is_running,
            settings(10, 2),
        );

        let outcome = request.run(&CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::Success(Status("Running")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let request = PollRequest::new(
            scripted(
                vec![Ok(Status("Pending")), Err(HttpStatus(403)), Ok(Status("Running"))],
                calls.clone(),
            ),
            is_running,
            settings(10, 5),
        );

        let outcome = request.run(&CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::Failed(HttpStatus(403)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_are_spaced_by_interval() {
        let stamps = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = stamps.clone();
        let request = PollRequest::new(
            move || {
                recorder.lock().unwrap().push(Instant::now());
                std::future::ready(Ok::<_, HttpStatus>(Status("Pending")))
            },
            is_running,
            settings(25, 4),
        );

        let outcome = request.run(&CancellationToken::new()).await;
        assert_eq!(outcome, PollOutcome::TimedOut);

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 4);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(25));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetches_never_overlap() {
        let in_flight = Arc::new(AtomicU32::new(0));
        let calls = Arc::new(AtomicU32::new(0));
        let (flight, counter) = (in_flight.clone(), calls.clone());

        let request = PollRequest::new(
            move || {
                let flight = flight.clone();
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(flight.fetch_add(1, Ordering::SeqCst), 0);
                    // Fetch takes longer than the interval
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, HttpStatus>(if n == 3 { Status("Running") } else { Status("Pending") })
                }
            },
            is_running,
            settings(10, 10),
        );

        let outcome = request.run(&CancellationToken::new()).await;
        assert_eq!(outcome, PollOutcome::Success(Status("Running")));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start() {
        let calls = Arc::new(AtomicU32::new(0));
        let request = PollRequest::new(
            scripted(vec![Ok(Status("Running"))], calls.clone()),
            is_running,
            settings(10, 5),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(request.run(&cancel).await, PollOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_attempts_stops_fetching() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let (counter, token) = (calls.clone(), cancel.clone());

        // Cancel right after the second fetch, while the delay is pending
        let request = PollRequest::new(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                    token.cancel();
                }
                std::future::ready(Ok::<_, HttpStatus>(Status("Pending")))
            },
            is_running,
            settings(10, 10),
        );

        assert_eq!(request.run(&cancel).await, PollOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let request = PollRequest::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<Status, HttpStatus>>()
            },
            is_running,
            settings(10, 10),
        );

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        });

        assert_eq!(request.run(&cancel).await, PollOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cycles_are_independent() {
        let calls_a = Arc::new(AtomicU32::new(0));
        let calls_b = Arc::new(AtomicU32::new(0));

        let a = PollRequest::new(
            scripted(vec![Ok(Status("Pending"))], calls_a.clone()),
            is_running,
            settings(10, 3),
        );
        let b = PollRequest::new(
            scripted(
                vec![
                    Ok(Status("Pending")),
                    Ok(Status("Pending")),
                    Ok(Status("Pending")),
                    Ok(Status("Pending")),
                    Ok(Status("Running")),
                ],
                calls_b.clone(),
            ),
            is_running,
            settings(7, 6),
        );

        let token_a = CancellationToken::new();
        let token_b = CancellationToken::new();
        let (outcome_a, outcome_b) = tokio::join!(a.run(&token_a), b.run(&token_b));

        assert_eq!(outcome_a, PollOutcome::TimedOut);
        assert_eq!(calls_a.load(Ordering::SeqCst), 3);
        assert_eq!(outcome_b, PollOutcome::Success(Status("Running")));
        assert_eq!(calls_b.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_outcome_into_result() {
        let ok: PollOutcome<u8, HttpStatus> = PollOutcome::Success(1);
        assert_eq!(ok.into_result().unwrap(), 1);

        let timed_out: PollOutcome<u8, HttpStatus> = PollOutcome::TimedOut;
        assert!(matches!(timed_out.into_result(), Err(PollError::Exhausted)));

        let failed: PollOutcome<u8, HttpStatus> = PollOutcome::Failed(HttpStatus(500));
        assert!(matches!(
            failed.into_result(),
            Err(PollError::Transport(HttpStatus(500)))
        ));

        let cancelled: PollOutcome<u8, HttpStatus> = PollOutcome::Cancelled;
        assert!(matches!(cancelled.into_result(), Err(PollError::Cancelled)));
    }

    #[test]
    fn test_outcome_state() {
        assert_eq!(
            PollOutcome::<(), ()>::Success(()).state(),
            PollState::Succeeded
        );
        assert_eq!(PollOutcome::<(), ()>::TimedOut.state(), PollState::TimedOut);
        assert_eq!(PollOutcome::<(), ()>::Failed(()).state(), PollState::Failed);
        assert_eq!(PollOutcome::<(), ()>::Cancelled.state(), PollState::Cancelled);
        assert!(!PollState::Polling.is_terminal());
        assert!(PollState::Cancelled.is_terminal());
    }
}
