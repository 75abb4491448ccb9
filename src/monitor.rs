//! The poll loop.
//!
//! Each iteration reads the process list and, only when the session count is
//! strictly greater than the threshold, reads the InnoDB status right away
//! and writes a report. Idle iterations write nothing to the report stream.

use std::io::Write;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::collector::{QueryError, SessionSource};
use crate::model::{Capture, EngineStatus, ProcessList};
use crate::report::{OutputError, Reporter};

/// Upper bound for a single retry delay.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Fatal loop failure.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Retries for failed queries. Zero retries means exit on the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(MAX_RETRY_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Result of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// At or below threshold; nothing written.
    Idle { sessions: usize },
    /// Above threshold; one report written.
    Reported { sessions: usize },
}

/// Loop settings derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub threshold: u64,
    pub interval: Duration,
    pub retry: RetryPolicy,
}

impl MonitorSettings {
    pub fn new(threshold: u64, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Owns the session source, the clock and the report stream for the
/// lifetime of the process.
pub struct Monitor<S, C, W: Write> {
    source: S,
    clock: C,
    reporter: Reporter<W>,
    settings: MonitorSettings,
    polls: u64,
    reports: u64,
}

impl<S: SessionSource, C: Clock, W: Write> Monitor<S, C, W> {
    pub fn new(source: S, clock: C, reporter: Reporter<W>, settings: MonitorSettings) -> Self {
        Self {
            source,
            clock,
            reporter,
            settings,
            polls: 0,
            reports: 0,
        }
    }

    /// Polls forever, sleeping `interval` after every iteration.
    /// Returns only when an iteration fails.
    pub fn run(&mut self) -> Result<(), MonitorError> {
        info!(
            "Watching sessions: threshold={}, interval={:?}",
            self.settings.threshold, self.settings.interval
        );
        loop {
            self.poll_once()?;
            self.clock.sleep(self.settings.interval);
        }
    }

    /// One iteration without the trailing sleep.
    ///
    /// A retry repeats the whole read, process list included, so the two
    /// snapshots of a report never have a backoff sleep between them.
    pub fn poll_once(&mut self) -> Result<PollOutcome, MonitorError> {
        self.polls += 1;
        let threshold = self.settings.threshold;

        let snapshot = with_retry(&mut self.source, &mut self.clock, self.settings.retry, |s| {
            read_snapshot(s, threshold)
        })?;
        let (processes, engine_status) = match snapshot {
            Snapshot::Idle { sessions } => {
                debug!("Poll #{}: {} sessions", self.polls, sessions);
                return Ok(PollOutcome::Idle { sessions });
            }
            Snapshot::Breach {
                processes,
                engine_status,
            } => (processes, engine_status),
        };
        let sessions = processes.len();
        let capture = Capture {
            captured_at: self.clock.now(),
            processes,
            engine_status,
        };

        self.reporter.report(&capture)?;
        self.reports += 1;
        info!(
            "Report #{}: {} sessions exceed threshold {}",
            self.reports, sessions, threshold
        );
        Ok(PollOutcome::Reported { sessions })
    }

    /// Iterations started so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Reports written so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn output(&self) -> &W {
        self.reporter.get_ref()
    }
}

/// What one read of the server produced.
enum Snapshot {
    Idle {
        sessions: usize,
    },
    Breach {
        processes: ProcessList,
        engine_status: EngineStatus,
    },
}

/// Reads the process list and, on a breach, the engine status straight after it.
fn read_snapshot<S: SessionSource>(source: &mut S, threshold: u64) -> Result<Snapshot, QueryError> {
    let processes = source.process_list()?;
    let sessions = processes.len();
    if sessions as u64 <= threshold {
        return Ok(Snapshot::Idle { sessions });
    }
    let engine_status = source.engine_status()?;
    Ok(Snapshot::Breach {
        processes,
        engine_status,
    })
}

fn with_retry<S, C, T>(
    source: &mut S,
    clock: &mut C,
    policy: RetryPolicy,
    mut query: impl FnMut(&mut S) -> Result<T, QueryError>,
) -> Result<T, QueryError>
where
    S: SessionSource,
    C: Clock,
{
    let mut attempt = 0;
    loop {
        match query(source) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                warn!(
                    "{} (retry {}/{} in {:?})",
                    e, attempt, policy.max_retries, delay
                );
                clock.sleep(delay);
            }
            Err(e) => {
                if attempt > 0 {
                    debug!("Giving up after {} retries", attempt);
                }
                return Err(e);
            }
        }
    }
}
