//! Command-line configuration.
//!
//! Everything is validated here, before the password prompt and before any
//! connection attempt, so a bad invocation fails fast.

use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::monitor::RetryPolicy;

/// Standard MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Administrative schema selected on connect.
pub const DEFAULT_DATABASE: &str = "mysql";

/// Errors raised while building a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing, unknown or unparsable arguments (also `--help`/`--version`).
    #[error(transparent)]
    Cli(#[from] clap::Error),

    #[error("--{0} must not be empty")]
    Empty(&'static str),

    #[error("--interval must be at least 1 second")]
    ZeroInterval,
}

/// Dumps the MySQL full process list and InnoDB status when the number of
/// sessions exceeds a threshold.
#[derive(Parser, Debug)]
#[command(
    name = "rmywatch",
    about = "Prints the MySQL full process list and InnoDB status when sessions exceed --max-threads",
    version
)]
pub struct Args {
    /// MySQL username with admin privileges.
    #[arg(short = 'U', long = "user", value_name = "USER")]
    pub user: String,

    /// MySQL hostname.
    #[arg(short = 'H', long = "host", value_name = "HOST")]
    pub host: String,

    /// MySQL port.
    #[arg(short = 'P', long = "port", value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of sessions to allow before printing the process list and InnoDB status.
    #[arg(short = 'T', long = "max-threads", value_name = "MAX_THREADS", value_parser = parse_threshold)]
    pub max_threads: u64,

    /// Schema selected on connect.
    #[arg(short = 'D', long = "database", value_name = "NAME", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Seconds to sleep between polls.
    #[arg(short = 'i', long = "interval", value_name = "SECS", default_value_t = 1)]
    pub interval: u64,

    /// Retry a failed query this many times before exiting.
    /// Default is to exit on the first failure.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub retries: u32,

    /// Delay before the first retry, doubled on each further attempt.
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub retry_backoff_ms: u64,

    /// Require TLS for the connection.
    #[arg(long)]
    pub ssl: bool,

    /// Use TLS but accept any server certificate. Implies --ssl.
    #[arg(long)]
    pub ssl_insecure: bool,

    /// TCP connect timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode - only log errors.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Parses the session threshold: a positive integer.
fn parse_threshold(s: &str) -> Result<u64, String> {
    let value = s
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid threshold '{}': {}", s, e))?;
    if value == 0 {
        return Err("threshold must be a positive integer".to_string());
    }
    Ok(value)
}

/// How TLS is negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Disabled,
    Verified,
    /// TLS without certificate or hostname checks.
    Insecure,
}

/// Everything needed to open the connection, minus the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub tls: TlsMode,
    pub connect_timeout: Duration,
}

/// Validated runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub connection: ConnectionSettings,
    /// Reports are emitted when the session count is strictly greater.
    pub threshold: u64,
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub verbose: u8,
    pub quiet: bool,
}

impl Config {
    /// Parses and validates the process arguments.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::try_parse_from(std::env::args_os())
    }

    /// Parses and validates an explicit argument list (first item is the binary name).
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Args::try_parse_from(args)?;
        Self::from_args(args)
    }

    /// Validates already parsed arguments.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.user.trim().is_empty() {
            return Err(ConfigError::Empty("user"));
        }
        if args.host.trim().is_empty() {
            return Err(ConfigError::Empty("host"));
        }
        if args.database.trim().is_empty() {
            return Err(ConfigError::Empty("database"));
        }
        if args.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        let tls = if args.ssl_insecure {
            TlsMode::Insecure
        } else if args.ssl {
            TlsMode::Verified
        } else {
            TlsMode::Disabled
        };

        Ok(Self {
            connection: ConnectionSettings {
                user: args.user,
                host: args.host,
                port: args.port,
                database: args.database,
                tls,
                connect_timeout: Duration::from_secs(args.connect_timeout),
            },
            threshold: args.max_threads,
            interval: Duration::from_secs(args.interval),
            retry: RetryPolicy::new(args.retries, Duration::from_millis(args.retry_backoff_ms)),
            verbose: args.verbose,
            quiet: args.quiet,
        })
    }
}
