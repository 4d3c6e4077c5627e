//! CLI subcommand handlers.

pub mod session;
