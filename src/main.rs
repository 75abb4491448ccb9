//! rmywatch - prints the MySQL full process list and InnoDB status whenever
//! the number of sessions exceeds `--max-threads`.
//!
//! Usage:
//!   rmywatch -U root -H db1 -T 200            # poll every second
//!   rmywatch -U root -H db1 -P 3307 -T 50 -i 5
//!   rmywatch -U root -H db1 -T 200 >> overload.log

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io;

use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use rmywatch::clock::SystemClock;
use rmywatch::collector::MysqlCollector;
use rmywatch::config::{Config, ConfigError};
use rmywatch::credentials::{CredentialProvider, TerminalPrompt};
use rmywatch::error::{AppError, Result};
use rmywatch::monitor::{Monitor, MonitorSettings};
use rmywatch::report::Reporter;

/// Initializes the tracing subscriber on stderr, keeping stdout for reports.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("rmywatch={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(config: Config) -> Result<()> {
    info!("rmywatch {} starting", env!("CARGO_PKG_VERSION"));

    let password = TerminalPrompt::default().password()?;
    let collector = MysqlCollector::connect(&config.connection, &password)?;
    drop(password);

    let settings = MonitorSettings::new(config.threshold, config.interval).with_retry(config.retry);
    let stdout = io::stdout();
    let mut monitor = Monitor::new(collector, SystemClock, Reporter::new(stdout.lock()), settings);
    monitor.run()?;
    Ok(())
}

fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        // Usage errors, --help and --version
        Err(ConfigError::Cli(e)) => e.exit(),
        Err(e) => {
            let e = AppError::from(e);
            eprintln!("rmywatch: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    init_logging(config.verbose, config.quiet);

    if let Err(e) = run(config) {
        eprintln!("rmywatch: {}", e);
        std::process::exit(e.exit_code());
    }
}
