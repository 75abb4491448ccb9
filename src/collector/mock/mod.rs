//! Scripted [`SessionSource`] for exercising the poll loop without a server.
//!
//! Each poll consumes one [`Step`]. Once the script is exhausted every query
//! fails, which is how tests stop [`Monitor::run`](crate::monitor::Monitor::run).

use std::collections::VecDeque;

use crate::collector::{ENGINE_STATUS_QUERY, PROCESS_LIST_QUERY, QueryError, SessionSource};
use crate::model::{EngineStatus, ProcessList, SessionRecord};

/// Which query the source was asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    ProcessList,
    EngineStatus,
}

/// Scripted response for one poll.
#[derive(Debug, Clone)]
pub enum Step {
    /// Process list with this many generated sessions.
    Sessions(usize),
    /// Process list query fails.
    ProcessListFails(String),
    /// Process list with this many sessions, then the status query fails.
    EngineStatusFails(usize, String),
}

/// Replays a fixed script of snapshots and records every call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    current: Option<Step>,
    engine_status: EngineStatus,
    calls: Vec<Call>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            engine_status: EngineStatus::new(vec![
                "InnoDB".to_string(),
                String::new(),
                "=====\nINNODB MONITOR OUTPUT\n=====".to_string(),
            ]),
            ..Self::default()
        }
    }

    /// Polls returning the given session counts, in order.
    pub fn with_counts(counts: &[usize]) -> Self {
        Self::new(counts.iter().copied().map(Step::Sessions))
    }

    /// Every query issued so far, in order.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

/// Session `id` as it would appear on a busy server.
pub fn sample_session(id: u64) -> SessionRecord {
    SessionRecord {
        id,
        user: "app".to_string(),
        host: format!("10.0.0.{}:{}", id % 250 + 1, 40000 + id),
        db: Some("shop".to_string()),
        command: "Query".to_string(),
        time: (id % 7) as i64,
        state: Some("executing".to_string()),
        info: Some(format!("SELECT * FROM orders WHERE customer_id = {}", id)),
    }
}

fn sessions(count: usize) -> ProcessList {
    ProcessList::new((1..=count as u64).map(sample_session).collect())
}

impl SessionSource for ScriptedSource {
    fn process_list(&mut self) -> Result<ProcessList, QueryError> {
        self.calls.push(Call::ProcessList);
        self.current = self.steps.pop_front();
        match &self.current {
            Some(Step::Sessions(n)) | Some(Step::EngineStatusFails(n, _)) => Ok(sessions(*n)),
            Some(Step::ProcessListFails(message)) => Err(QueryError::Failed {
                query: PROCESS_LIST_QUERY,
                message: message.clone(),
            }),
            None => Err(QueryError::Failed {
                query: PROCESS_LIST_QUERY,
                message: "script exhausted".to_string(),
            }),
        }
    }

    fn engine_status(&mut self) -> Result<EngineStatus, QueryError> {
        self.calls.push(Call::EngineStatus);
        match &self.current {
            Some(Step::EngineStatusFails(_, message)) => Err(QueryError::Failed {
                query: ENGINE_STATUS_QUERY,
                message: message.clone(),
            }),
            _ => Ok(self.engine_status.clone()),
        }
    }
}
