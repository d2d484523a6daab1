//! I/O helpers for ralph commands.

pub mod agent;
pub mod config;
pub mod init;
pub mod iteration_log;
pub mod process;
pub mod prompt;
