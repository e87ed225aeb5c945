//! CLI subcommands.

pub mod demo;
pub mod shell;
