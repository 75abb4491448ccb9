//! Plain-text report written when the session threshold is exceeded.

use std::borrow::Cow;
use std::io::{self, Write};

use thiserror::Error;

use crate::model::{Capture, SessionRecord};

/// Width of the rule opening every report.
const BANNER_WIDTH: usize = 120;
/// Width of the rules around each section.
const SECTION_RULE_WIDTH: usize = 20;
/// Separator between session fields.
const FIELD_SEPARATOR: &str = "\t | ";
/// Rendering of NULL columns.
const NULL: &str = "NULL";
/// `2024-03-19T10:05:39.482383`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Failure writing a report.
#[derive(Debug, Error)]
#[error("failed to write report: {0}")]
pub struct OutputError(#[from] pub io::Error);

/// Writes [`Capture`]s to an output stream.
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes one report and flushes the stream.
    pub fn report(&mut self, capture: &Capture) -> Result<(), OutputError> {
        let out = &mut self.out;

        writeln!(out, "{}", "=".repeat(BANNER_WIDTH))?;
        writeln!(
            out,
            "Date & Time:  {}",
            capture.captured_at.format(TIMESTAMP_FORMAT)
        )?;
        writeln!(out)?;

        writeln!(out, "Full process list:")?;
        writeln!(out, "{}", "=".repeat(SECTION_RULE_WIDTH))?;
        for session in &capture.processes.sessions {
            writeln!(out, "{}", format_session(session))?;
        }
        writeln!(out)?;

        writeln!(out, "{}", "=".repeat(SECTION_RULE_WIDTH))?;
        writeln!(out, "InnoDB status:")?;
        for line in &capture.engine_status.lines {
            writeln!(out, "{}", line)?;
        }
        writeln!(out)?;
        writeln!(out)?;

        out.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Renders one session as a single line, fields in process list order.
pub fn format_session(session: &SessionRecord) -> String {
    let id = session.id.to_string();
    let time = session.time.to_string();
    let fields: [&str; 8] = [
        &id,
        &session.user,
        &session.host,
        session.db.as_deref().unwrap_or(NULL),
        &session.command,
        &time,
        session.state.as_deref().unwrap_or(NULL),
        session.info.as_deref().unwrap_or(NULL),
    ];

    fields
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Keeps multi-line statements on their session's line.
///
/// Backslashes are doubled first so an escaped line break cannot be confused
/// with a literal `\n` in the statement text.
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains(['\\', '\n', '\r']) {
        Cow::Owned(
            field
                .replace('\\', "\\\\")
                .replace('\r', "\\r")
                .replace('\n', "\\n"),
        )
    } else {
        Cow::Borrowed(field)
    }
}
