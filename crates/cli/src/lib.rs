//! Hello-world driver for the out-of-band bootstrap.
//!
//! One process listens, the other connects with `-n <host>`. They meet at a
//! barrier, the connector ships a test string prepared in the selected
//! memory kind, the listener checks it, and both meet again before closing.

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
