//! Stable exit codes for ralph CLI commands.

/// Command succeeded; for `ralph run`, the completion sentinel was seen.
pub const OK: i32 = 0;
/// `ralph run` used its whole iteration budget without seeing the completion sentinel.
pub const EXHAUSTED: i32 = 1;
/// Invalid arguments, config, or template, or any other runner error.
pub const INVALID: i32 = 2;
