//! Bounded iteration runner for external coding agents.
//!
//! `ralph run` invokes an agent once per iteration with a rendered prompt, then
//! scans the captured output for a completion sentinel. The plan document the agent
//! works from is the agent's own state; the runner never reads or edits it during
//! a run.
//!
//! - **[`core`]**: Pure logic (sentinel detection, stack catalog, run types).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, child processes, prompt
//!   templates, scaffolding, iteration logs).
//!
//! [`looping`] ties the two together behind the [`io::agent::Agent`] seam.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
