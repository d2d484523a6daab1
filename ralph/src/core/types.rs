//! Shared types between the iteration loop, the agent adapter and the CLI.
//!
//! These are plain data. Nothing here touches the filesystem or spawns processes.

use std::time::Duration;

use anyhow::{Result, bail};

use crate::core::signal::Signal;
use crate::core::stacks::StackProfile;

/// Immutable inputs of a single `ralph run`.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub task: String,
    pub stack: StackProfile,
    /// Fully rendered prompt handed to the agent every iteration.
    pub prompt: String,
}

impl RunRequest {
    /// Build a request, rejecting an empty task.
    pub fn new(task: impl Into<String>, stack: StackProfile, prompt: String) -> Result<Self> {
        let task = task.into();
        if task.trim().is_empty() {
            bail!("task description must not be empty");
        }
        Ok(Self {
            task,
            stack,
            prompt,
        })
    }
}

/// Pacing and budget for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_iterations: u32,
    /// Flat pause between iterations.
    pub delay: Duration,
}

/// Clamp a user-supplied iteration limit: zero and negatives mean "run nothing".
pub fn normalize_limit(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

/// One pass of the loop, handed to the progress callback and then dropped.
#[derive(Debug, Clone)]
pub struct IterationReport {
    /// 1-based.
    pub iteration: u32,
    pub max_iterations: u32,
    pub output: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    /// Set when the agent could not be invoked at all.
    pub error: Option<String>,
    pub signal: Signal,
    pub blocked: bool,
    pub duration: Duration,
}

/// Progress notifications emitted by the loop.
#[derive(Debug, Clone, Copy)]
pub enum LoopEvent<'a> {
    /// About to invoke the agent.
    Started { iteration: u32, max_iterations: u32 },
    /// The agent returned (or failed to start) and its output was inspected.
    Finished(&'a IterationReport),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// The completion sentinel was seen.
    Completed,
    /// The iteration budget ran out first.
    Exhausted,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub stop: LoopStop,
    /// Number of agent invocations performed.
    pub iterations: u32,
    /// Iterations whose output carried the blocked marker.
    pub blocked_iterations: Vec<u32>,
}

impl LoopOutcome {
    pub fn is_completed(&self) -> bool {
        self.stop == LoopStop::Completed
    }
}
