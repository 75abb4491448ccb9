//! Password acquisition.
//!
//! The password is read once, before connecting, and only ever lives in a
//! [`Password`] value whose `Debug` output is redacted.

use std::fmt;
use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use thiserror::Error;

/// Errors raised while obtaining the password.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password prompt interrupted")]
    Interrupted,

    #[error("cannot read password from terminal: {0}")]
    Terminal(#[from] io::Error),
}

/// A secret that must never be printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the secret for handing to the driver.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Source of the connection password.
pub trait CredentialProvider {
    fn password(&mut self) -> Result<Password, CredentialError>;
}

/// Returns a preset password without any interaction.
#[derive(Debug, Clone)]
pub struct FixedCredential(Password);

impl FixedCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Password::new(secret))
    }
}

impl CredentialProvider for FixedCredential {
    fn password(&mut self) -> Result<Password, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Prompts on the terminal with echo disabled.
///
/// The prompt goes to stderr so stdout carries nothing but reports.
#[derive(Debug, Clone)]
pub struct TerminalPrompt {
    prompt: String,
}

impl TerminalPrompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new("Password: ")
    }
}

impl CredentialProvider for TerminalPrompt {
    fn password(&mut self) -> Result<Password, CredentialError> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", self.prompt)?;
        stderr.flush()?;

        let result = {
            let _raw = RawModeGuard::enable()?;
            read_secret()
        };

        writeln!(stderr)?;
        result.map(Password)
    }
}

/// Keeps the terminal in raw mode until dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn read_secret() -> Result<String, CredentialError> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match apply_key(&mut secret, key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Submit => return Ok(secret),
            KeyOutcome::Abort => return Err(CredentialError::Interrupted),
        }
    }
}

/// Result of feeding one key press into the line being typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Submit,
    Abort,
}

fn apply_key(secret: &mut String, key: KeyEvent) -> KeyOutcome {
    if key.kind == KeyEventKind::Release {
        return KeyOutcome::Continue;
    }
    // AltGr arrives as CONTROL | ALT on Windows and produces printable characters.
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL)
        && !key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        KeyCode::Enter => KeyOutcome::Submit,
        KeyCode::Char('c') if ctrl => KeyOutcome::Abort,
        KeyCode::Char('d') if ctrl => {
            if secret.is_empty() {
                KeyOutcome::Abort
            } else {
                KeyOutcome::Continue
            }
        }
        KeyCode::Char('u') if ctrl => {
            secret.clear();
            KeyOutcome::Continue
        }
        KeyCode::Char(_) if ctrl => KeyOutcome::Continue,
        KeyCode::Char(c) => {
            secret.push(c);
            KeyOutcome::Continue
        }
        KeyCode::Backspace => {
            secret.pop();
            KeyOutcome::Continue
        }
        _ => KeyOutcome::Continue,
    }
}
