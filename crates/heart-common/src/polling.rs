//! Assistant run polling as an explicit state machine.
//!
//! `RunPoller` is pure: it is fed observed run states plus the elapsed time and answers
//! with the next step. `poll_run` drives it against an async status source using an
//! injected `Clock`, so tests can run the whole loop without real sleeps.
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Completed,
    Failed(String),
    Expired,
    TimedOut,
}

impl RunState {
    /// Map an Assistants API run status onto a polling state.
    ///
    /// Unknown statuses are treated as still pending; the timeout bounds them.
    pub fn from_status(status: &str, failure_reason: Option<String>) -> Self {
        match status {
            "completed" => Self::Completed,
            "failed" | "cancelled" | "incomplete" => Self::Failed(
                failure_reason.unwrap_or_else(|| format!("run {status}")),
            ),
            "expired" => Self::Expired,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::Expired => f.write_str("expired"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(110),
        }
    }
}

impl PollPolicy {
    /// Optional:
    /// - `HEART_POLL_INTERVAL_MS` (default: 1000)
    /// - `HEART_POLL_TIMEOUT_SECS` (default: 110)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let interval = std::env::var("HEART_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&n| n > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.interval);

        let timeout = std::env::var("HEART_POLL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self { interval, timeout }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Continue(Duration),
    Finished(RunState),
}

#[derive(Debug)]
pub struct RunPoller {
    policy: PollPolicy,
    state: RunState,
    observations: u32,
}

impl RunPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            state: RunState::Pending,
            observations: 0,
        }
    }

    pub fn observations(&self) -> u32 {
        self.observations
    }

    /// Feed one observed state taken `elapsed` after polling began.
    ///
    /// Terminal observations finish immediately. A pending observation at or past the
    /// timeout finishes as `TimedOut`; otherwise the wait never overshoots the deadline.
    pub fn observe(&mut self, observed: RunState, elapsed: Duration) -> PollStep {
        if self.state.is_terminal() {
            return PollStep::Finished(self.state.clone());
        }
        self.observations += 1;

        if observed.is_terminal() {
            self.state = observed;
            return PollStep::Finished(self.state.clone());
        }

        if elapsed >= self.policy.timeout {
            self.state = RunState::TimedOut;
            return PollStep::Finished(RunState::TimedOut);
        }

        let remaining = self.policy.timeout - elapsed;
        PollStep::Continue(self.policy.interval.min(remaining))
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Poll `fetch` until the run reaches a terminal state or the policy times out.
///
/// Errors from `fetch` abort polling and are returned as-is.
pub async fn poll_run<C, F, Fut, E>(clock: &C, policy: PollPolicy, mut fetch: F) -> Result<RunState, E>
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunState, E>>,
{
    let started = clock.now();
    let mut poller = RunPoller::new(policy);
    loop {
        let observed = fetch().await?;
        let elapsed = clock.now().saturating_duration_since(started);
        match poller.observe(observed, elapsed) {
            PollStep::Finished(outcome) => {
                debug!(
                    outcome = %outcome,
                    observations = poller.observations(),
                    elapsed_ms = elapsed.as_millis(),
                    "run polling finished"
                );
                return Ok(outcome);
            }
            PollStep::Continue(wait) => clock.sleep(wait).await,
        }
    }
}
