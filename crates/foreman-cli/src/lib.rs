//! Foreman CLI library.
//!
//! Argument parsing, process wiring and the command handlers behind the
//! `foreman` binary.

pub mod app;
pub mod cli;
pub mod commands;
