//! Inbound adapters that translate command-line invocations into domain
//! service calls while keeping framework details at the edge.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command};
pub use commands::{CommandReport, execute};
