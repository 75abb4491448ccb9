//! MySQL connection and the two introspection queries.

use mysql::prelude::Queryable;
use mysql::{Conn, DriverError, Opts, OptsBuilder, Row, SslOpts, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::queries::{ENGINE_STATUS_QUERY, PROCESS_LIST_COLUMNS, PROCESS_LIST_QUERY};
use super::{QueryError, SessionSource};
use crate::config::{ConnectionSettings, TlsMode};
use crate::credentials::Password;
use crate::model::{EngineStatus, ProcessList, SessionRecord};

/// ER_DBACCESS_DENIED_ERROR
const ER_DBACCESS_DENIED: u16 = 1044;
/// ER_ACCESS_DENIED_ERROR
const ER_ACCESS_DENIED: u16 = 1045;
/// ER_ACCESS_DENIED_NO_PASSWORD_ERROR
const ER_ACCESS_DENIED_NO_PASSWORD: u16 = 1698;

/// Failure to establish the connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("access denied for '{user}' on {endpoint}: {message}")]
    Authentication {
        user: String,
        endpoint: String,
        message: String,
    },

    #[error("cannot reach {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("protocol error talking to {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },
}

impl ConnectionError {
    fn classify(err: &mysql::Error, user: &str, endpoint: &str) -> Self {
        let message = err.to_string();
        let endpoint = endpoint.to_string();
        match err {
            mysql::Error::MySqlError(e)
                if matches!(
                    e.code,
                    ER_DBACCESS_DENIED | ER_ACCESS_DENIED | ER_ACCESS_DENIED_NO_PASSWORD
                ) =>
            {
                Self::Authentication {
                    user: user.to_string(),
                    endpoint,
                    message,
                }
            }
            mysql::Error::IoError(_)
            | mysql::Error::DriverError(DriverError::CouldNotConnect(_))
            | mysql::Error::DriverError(DriverError::ConnectTimeout) => {
                Self::Unreachable { endpoint, message }
            }
            _ => Self::Protocol { endpoint, message },
        }
    }
}

/// Opens connections. The production implementation wraps the driver's [`Opts`].
pub trait Connector {
    type Connection: Connection;

    fn open(&self) -> Result<Self::Connection, mysql::Error>;
}

/// An open connection able to run text-protocol queries.
pub trait Connection {
    fn rows(&mut self, query: &str) -> Result<Vec<Vec<Value>>, mysql::Error>;

    fn server_version(&self) -> (u16, u16, u16);
}

/// Connects with fixed driver options.
pub struct OptsConnector {
    opts: Opts,
}

impl Connector for OptsConnector {
    type Connection = Conn;

    fn open(&self) -> Result<Conn, mysql::Error> {
        Conn::new(self.opts.clone())
    }
}

impl Connection for Conn {
    fn rows(&mut self, query: &str) -> Result<Vec<Vec<Value>>, mysql::Error> {
        let rows: Vec<Row> = self.query(query)?;
        Ok(rows.iter().map(row_values).collect())
    }

    fn server_version(&self) -> (u16, u16, u16) {
        Conn::server_version(self)
    }
}

/// Holds the single long-lived connection.
///
/// The connection is opened eagerly by [`MysqlCollector::connect`]. If a
/// query fails the connection is dropped and re-opened on the next query.
pub struct MysqlCollector<C: Connector = OptsConnector> {
    connector: C,
    user: String,
    endpoint: String,
    conn: Option<C::Connection>,
}

impl MysqlCollector {
    /// Opens the connection. Failure here is fatal for the caller.
    pub fn connect(
        settings: &ConnectionSettings,
        password: &Password,
    ) -> Result<Self, ConnectionError> {
        let connector = OptsConnector {
            opts: build_opts(settings, password),
        };
        let collector = Self::with_connector(
            connector,
            settings.user.clone(),
            format!("{}:{}", settings.host, settings.port),
        )?;

        if let Some((major, minor, patch)) = collector.server_version() {
            info!(
                "Connected to {} as {} (server {}.{}.{}, schema {})",
                collector.endpoint, collector.user, major, minor, patch, settings.database
            );
        }
        Ok(collector)
    }
}

impl<C: Connector> MysqlCollector<C> {
    fn with_connector(connector: C, user: String, endpoint: String) -> Result<Self, ConnectionError> {
        let mut collector = Self {
            connector,
            user,
            endpoint,
            conn: None,
        };
        collector.ensure_connected()?;
        Ok(collector)
    }

    /// Version reported by the server during the handshake.
    pub fn server_version(&self) -> Option<(u16, u16, u16)> {
        self.conn.as_ref().map(|c| c.server_version())
    }

    fn ensure_connected(&mut self) -> Result<&mut C::Connection, ConnectionError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                debug!("Connecting to {}", self.endpoint);
                self.connector
                    .open()
                    .map_err(|e| ConnectionError::classify(&e, &self.user, &self.endpoint))?
            }
        };
        Ok(self.conn.insert(conn))
    }

    fn query_rows(&mut self, query: &'static str) -> Result<Vec<Vec<Value>>, QueryError> {
        let reconnecting = self.conn.is_none();
        let conn = self.ensure_connected()?;
        if reconnecting {
            info!("Reconnected to server");
        }

        match conn.rows(query) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!("{} failed, dropping connection", query);
                self.conn = None;
                Err(QueryError::Failed {
                    query,
                    message: e.to_string(),
                })
            }
        }
    }
}

impl<C: Connector> SessionSource for MysqlCollector<C> {
    fn process_list(&mut self) -> Result<ProcessList, QueryError> {
        let rows = self.query_rows(PROCESS_LIST_QUERY)?;
        let sessions = rows
            .into_iter()
            .map(session_from_values)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProcessList::new(sessions))
    }

    fn engine_status(&mut self) -> Result<EngineStatus, QueryError> {
        let rows = self.query_rows(ENGINE_STATUS_QUERY)?;
        Ok(engine_status_from_rows(rows))
    }
}

fn build_opts(settings: &ConnectionSettings, password: &Password) -> Opts {
    let ssl_opts = match settings.tls {
        TlsMode::Disabled => None,
        TlsMode::Verified => Some(SslOpts::default()),
        TlsMode::Insecure => Some(
            SslOpts::default()
                .with_danger_accept_invalid_certs(true)
                .with_danger_skip_domain_validation(true),
        ),
    };

    OptsBuilder::new()
        .ip_or_hostname(Some(settings.host.clone()))
        .tcp_port(settings.port)
        .user(Some(settings.user.clone()))
        .pass(Some(password.expose().to_string()))
        .db_name(Some(settings.database.clone()))
        .tcp_connect_timeout(Some(settings.connect_timeout))
        .ssl_opts(ssl_opts)
        .into()
}

fn row_values(row: &Row) -> Vec<Value> {
    (0..row.len())
        .map(|i| row.as_ref(i).cloned().unwrap_or(Value::NULL))
        .collect()
}

/// Maps one `SHOW FULL PROCESSLIST` row, positionally, onto a [`SessionRecord`].
fn session_from_values(values: Vec<Value>) -> Result<SessionRecord, QueryError> {
    if values.len() < PROCESS_LIST_COLUMNS {
        return Err(malformed(format!(
            "expected {} columns, got {}",
            PROCESS_LIST_COLUMNS,
            values.len()
        )));
    }

    let mut columns = values.into_iter().map(value_text);
    let mut next = || columns.next().flatten();

    let id = next()
        .ok_or_else(|| malformed("NULL Id".to_string()))?
        .parse::<u64>()
        .map_err(|e| malformed(format!("bad Id: {}", e)))?;
    let user = next().unwrap_or_default();
    let host = next().unwrap_or_default();
    let db = next();
    let command = next().unwrap_or_default();
    let time = match next() {
        Some(t) => t
            .parse::<i64>()
            .map_err(|e| malformed(format!("bad Time '{}': {}", t, e)))?,
        None => 0,
    };
    let state = next();
    let info = next();

    Ok(SessionRecord {
        id,
        user,
        host,
        db,
        command,
        time,
        state,
        info,
    })
}

fn malformed(message: String) -> QueryError {
    QueryError::Malformed {
        query: PROCESS_LIST_QUERY,
        message,
    }
}

/// Flattens every column of every row into display units.
fn engine_status_from_rows(rows: Vec<Vec<Value>>) -> EngineStatus {
    let lines = rows
        .into_iter()
        .flatten()
        .map(|v| value_text(v).unwrap_or_else(|| "NULL".to_string()))
        .collect();
    EngineStatus::new(lines)
}

/// Text form of a column value; `None` for SQL NULL.
///
/// The text protocol delivers nearly everything as bytes; the other
/// variants only appear with binary-protocol servers or proxies.
fn value_text(value: Value) -> Option<String> {
    let text = match value {
        Value::NULL => return None,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        },
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut s = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if micros > 0 {
                s.push_str(&format!(".{:06}", micros));
            }
            s
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let mut s = format!(
                "{}{:02}:{:02}:{:02}",
                if negative { "-" } else { "" },
                u64::from(days) * 24 + u64::from(hours),
                minutes,
                seconds
            );
            if micros > 0 {
                s.push_str(&format!(".{:06}", micros));
            }
            s
        }
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql::MySqlError;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    fn bytes(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    fn process_row() -> Vec<Value> {
        vec![
            bytes("1234"),
            bytes("app"),
            bytes("10.1.2.3:40112"),
            bytes("shop"),
            bytes("Query"),
            bytes("17"),
            bytes("executing"),
            bytes("SELECT * FROM orders"),
        ]
    }

    type Script<T> = Rc<RefCell<VecDeque<Result<T, mysql::Error>>>>;

    /// Connector whose opens and queries follow a script; unscripted calls succeed.
    #[derive(Default)]
    struct ScriptedConnector {
        opens: Rc<Cell<u32>>,
        connects: Script<()>,
        queries: Script<Vec<Vec<Value>>>,
    }

    struct ScriptedConnection {
        queries: Script<Vec<Vec<Value>>>,
    }

    impl Connector for ScriptedConnector {
        type Connection = ScriptedConnection;

        fn open(&self) -> Result<ScriptedConnection, mysql::Error> {
            self.opens.set(self.opens.get() + 1);
            self.connects.borrow_mut().pop_front().unwrap_or(Ok(()))?;
            Ok(ScriptedConnection {
                queries: self.queries.clone(),
            })
        }
    }

    impl Connection for ScriptedConnection {
        fn rows(&mut self, _query: &str) -> Result<Vec<Vec<Value>>, mysql::Error> {
            self.queries.borrow_mut().pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn server_version(&self) -> (u16, u16, u16) {
            (8, 0, 36)
        }
    }

    fn gone_away() -> mysql::Error {
        mysql::Error::IoError(io::Error::new(io::ErrorKind::ConnectionReset, "server has gone away"))
    }

    fn scripted_collector(
        connects: Vec<Result<(), mysql::Error>>,
        queries: Vec<Result<Vec<Vec<Value>>, mysql::Error>>,
    ) -> (MysqlCollector<ScriptedConnector>, Rc<Cell<u32>>) {
        let connector = ScriptedConnector {
            connects: Rc::new(RefCell::new(connects.into())),
            queries: Rc::new(RefCell::new(queries.into())),
            ..ScriptedConnector::default()
        };
        let opens = connector.opens.clone();
        let collector =
            MysqlCollector::with_connector(connector, "root".to_string(), "db1:3306".to_string())
                .unwrap();
        (collector, opens)
    }

    #[test]
    fn connects_eagerly() {
        let (collector, opens) = scripted_collector(vec![], vec![]);
        assert_eq!(opens.get(), 1);
        assert_eq!(collector.server_version(), Some((8, 0, 36)));
    }

    #[test]
    fn initial_connect_failure_is_a_connection_error() {
        let connector = ScriptedConnector {
            connects: Rc::new(RefCell::new(vec![Err(gone_away())].into())),
            ..ScriptedConnector::default()
        };
        let result =
            MysqlCollector::with_connector(connector, "root".to_string(), "db1:3306".to_string());
        assert!(matches!(result, Err(ConnectionError::Unreachable { .. })));
    }

    #[test]
    fn failed_query_drops_the_connection() {
        let (mut collector, opens) = scripted_collector(vec![], vec![Err(gone_away())]);

        let err = collector.process_list().unwrap_err();
        assert!(matches!(err, QueryError::Failed { query: PROCESS_LIST_QUERY, .. }));
        assert!(collector.conn.is_none());
        assert_eq!(opens.get(), 1);
    }

    #[test]
    fn next_query_reconnects() {
        let (mut collector, opens) =
            scripted_collector(vec![], vec![Err(gone_away()), Ok(vec![process_row()])]);

        assert!(collector.process_list().is_err());
        let list = collector.process_list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(opens.get(), 2);
        assert!(collector.conn.is_some());
    }

    #[test]
    fn failed_reconnect_is_a_query_error() {
        let (mut collector, opens) =
            scripted_collector(vec![Ok(()), Err(gone_away())], vec![Err(gone_away())]);

        assert!(collector.engine_status().is_err());
        let err = collector.engine_status().unwrap_err();
        assert!(matches!(
            err,
            QueryError::Reconnect(ConnectionError::Unreachable { .. })
        ));
        assert!(collector.conn.is_none());
        assert_eq!(opens.get(), 2);
    }

    #[test]
    fn healthy_connection_is_reused() {
        let (mut collector, opens) = scripted_collector(vec![], vec![]);
        for _ in 0..5 {
            collector.process_list().unwrap();
        }
        assert_eq!(opens.get(), 1);
    }

    #[test]
    fn session_from_text_protocol_row() {
        let session = session_from_values(process_row()).unwrap();
        assert_eq!(
            session,
            SessionRecord {
                id: 1234,
                user: "app".to_string(),
                host: "10.1.2.3:40112".to_string(),
                db: Some("shop".to_string()),
                command: "Query".to_string(),
                time: 17,
                state: Some("executing".to_string()),
                info: Some("SELECT * FROM orders".to_string()),
            }
        );
    }

    #[test]
    fn session_with_nulls_and_extra_columns() {
        let mut row = process_row();
        row[3] = Value::NULL;
        row[6] = Value::NULL;
        row[7] = Value::NULL;
        // MariaDB's Progress column
        row.push(bytes("0.000"));

        let session = session_from_values(row).unwrap();
        assert_eq!(session.db, None);
        assert_eq!(session.state, None);
        assert_eq!(session.info, None);
        assert_eq!(session.command, "Query");
    }

    #[test]
    fn session_from_binary_values() {
        let mut row = process_row();
        row[0] = Value::UInt(99);
        row[5] = Value::Int(-1);
        let session = session_from_values(row).unwrap();
        assert_eq!(session.id, 99);
        assert_eq!(session.time, -1);
    }

    #[test]
    fn short_row_is_malformed() {
        let err = session_from_values(vec![bytes("1"), bytes("root")]).unwrap_err();
        assert!(matches!(err, QueryError::Malformed { .. }));
    }

    #[test]
    fn non_numeric_id_is_malformed() {
        let mut row = process_row();
        row[0] = bytes("abc");
        assert!(matches!(
            session_from_values(row),
            Err(QueryError::Malformed { .. })
        ));
    }

    #[test]
    fn engine_status_keeps_every_column_verbatim() {
        let status = "\n=====================================\nINNODB MONITOR OUTPUT\n";
        let rows = vec![vec![bytes("InnoDB"), bytes(""), bytes(status)]];
        let engine = engine_status_from_rows(rows);
        assert_eq!(engine.lines, ["InnoDB", "", status]);
    }

    #[test]
    fn value_text_formats_temporal_values() {
        assert_eq!(
            value_text(Value::Date(2024, 3, 9, 7, 5, 1, 0)).as_deref(),
            Some("2024-03-09 07:05:01")
        );
        assert_eq!(
            value_text(Value::Time(true, 1, 2, 3, 4, 500)).as_deref(),
            Some("-26:03:04.000500")
        );
        assert_eq!(value_text(Value::NULL), None);
    }

    #[test]
    fn value_text_replaces_invalid_utf8() {
        let text = value_text(Value::Bytes(vec![b'o', b'k', 0xff])).unwrap();
        assert!(text.starts_with("ok"));
    }

    #[test]
    fn access_denied_is_authentication_failure() {
        let err = mysql::Error::MySqlError(MySqlError {
            state: "28000".to_string(),
            message: "Access denied for user 'root'@'10.0.0.1' (using password: YES)".to_string(),
            code: ER_ACCESS_DENIED,
        });
        let classified = ConnectionError::classify(&err, "root", "db1:3306");
        assert!(matches!(classified, ConnectionError::Authentication { .. }));
        assert!(classified.to_string().contains("db1:3306"));
    }

    #[test]
    fn io_error_is_unreachable() {
        let err = mysql::Error::IoError(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let classified = ConnectionError::classify(&err, "root", "db1:3306");
        assert!(matches!(classified, ConnectionError::Unreachable { .. }));
    }

    #[test]
    fn other_server_errors_are_protocol_failures() {
        let err = mysql::Error::MySqlError(MySqlError {
            state: "08004".to_string(),
            message: "Too many connections".to_string(),
            code: 1040,
        });
        let classified = ConnectionError::classify(&err, "root", "db1:3306");
        assert!(matches!(classified, ConnectionError::Protocol { .. }));
    }

    #[test]
    fn build_opts_carries_connection_settings() {
        let settings = ConnectionSettings {
            user: "root".to_string(),
            host: "db1".to_string(),
            port: 3306,
            database: "mysql".to_string(),
            tls: TlsMode::Disabled,
            connect_timeout: std::time::Duration::from_secs(1),
        };
        let opts = build_opts(&settings, &Password::new("s3cret"));
        assert_eq!(opts.get_pass(), Some("s3cret"));
        assert_eq!(opts.get_db_name(), Some("mysql"));
        assert_eq!(opts.get_tcp_port(), 3306);
    }
}
