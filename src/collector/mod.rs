//! Session and engine status collection.
//!
//! [`SessionSource`] is the seam between the poll loop and the server:
//! - [`MysqlCollector`] - the live connection
//! - [`mock::ScriptedSource`] - scripted snapshots for tests

pub mod mock;
mod mysql_collector;
mod queries;

use thiserror::Error;

use crate::model::{EngineStatus, ProcessList};

pub use mysql_collector::{Connection, ConnectionError, Connector, MysqlCollector, OptsConnector};
pub use queries::{ENGINE_STATUS_QUERY, PROCESS_LIST_QUERY};

/// Failure of one of the introspection queries.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{query} failed: {message}")]
    Failed { query: &'static str, message: String },

    #[error("{query} returned an unexpected row: {message}")]
    Malformed { query: &'static str, message: String },

    #[error("lost connection and could not reconnect: {0}")]
    Reconnect(#[from] ConnectionError),
}

/// Read-only view of the monitored server's sessions.
pub trait SessionSource {
    /// Runs the process list query.
    fn process_list(&mut self) -> Result<ProcessList, QueryError>;

    /// Runs the engine diagnostics query.
    fn engine_status(&mut self) -> Result<EngineStatus, QueryError>;
}
