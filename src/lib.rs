//! rmywatch - dumps the MySQL process list and InnoDB status on session overload.
//!
//! Provides:
//! - `config` - command-line parsing and validation
//! - `credentials` - password prompt behind a pluggable provider
//! - `collector` - the MySQL connection and the introspection queries
//! - `monitor` - the poll loop
//! - `report` - plain-text report formatting
//! - `clock` - injectable time source for the loop

pub mod clock;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod error;
pub mod model;
pub mod monitor;
pub mod report;
