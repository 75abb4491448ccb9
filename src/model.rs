//! Snapshot types captured on each poll.
//!
//! Nothing here outlives a single poll cycle: the process list is read,
//! compared against the threshold and, if reported, dropped.

use chrono::{DateTime, Local};

/// One row of `SHOW FULL PROCESSLIST`.
///
/// Field order matches the server's column order and is the order used by
/// the report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    /// Connection (thread) id.
    pub id: u64,
    pub user: String,
    pub host: String,
    /// Default schema of the session, if any.
    pub db: Option<String>,
    /// Command class, e.g. `Query`, `Sleep`, `Binlog Dump`.
    pub command: String,
    /// Seconds spent in the current state.
    pub time: i64,
    pub state: Option<String>,
    /// Full statement text.
    pub info: Option<String>,
}

/// Ordered sessions returned by one process list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessList {
    pub sessions: Vec<SessionRecord>,
}

impl ProcessList {
    pub fn new(sessions: Vec<SessionRecord>) -> Self {
        Self { sessions }
    }

    /// Number of active sessions, i.e. the value compared to the threshold.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Output of `SHOW ENGINE INNODB STATUS`, kept as opaque text.
///
/// Every column of every returned row is one display unit. The `Status`
/// column is a single multi-line blob and is never split or parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub lines: Vec<String>,
}

impl EngineStatus {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

/// Both snapshots of a threshold breach together with the capture time.
#[derive(Debug, Clone)]
pub struct Capture {
    pub captured_at: DateTime<Local>,
    pub processes: ProcessList,
    pub engine_status: EngineStatus,
}
