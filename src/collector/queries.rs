//! Introspection statements.

/// One row per connection with the untruncated statement text.
pub const PROCESS_LIST_QUERY: &str = "SHOW FULL PROCESSLIST";

/// InnoDB monitor output: a single `Type | Name | Status` row.
pub const ENGINE_STATUS_QUERY: &str = "SHOW ENGINE INNODB STATUS";

/// Column count of `SHOW FULL PROCESSLIST` on MySQL.
/// MariaDB and Percona append extra columns, which are ignored.
pub const PROCESS_LIST_COLUMNS: usize = 8;
