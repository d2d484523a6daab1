//! Agent abstraction for per-iteration invocation.
//!
//! The [`Agent`] trait decouples the loop from the actual backend (by default
//! `claude -p`). Tests use scripted agents that return canned output without
//! spawning processes.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{Capture, run_command, tee};

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest<'a> {
    /// 1-based iteration index.
    pub iteration: u32,
    pub task: &'a str,
    pub stack: &'a str,
    pub prompt: &'a str,
}

/// What came back from the agent. Only `output` drives the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    /// Combined stdout + stderr.
    pub output: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
}

impl AgentReply {
    /// A clean exit with the given output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(0),
            success: true,
            timed_out: false,
        }
    }
}

/// Abstraction over agent backends.
pub trait Agent {
    /// Run one agent turn. `Err` means the agent could not be invoked at all; a
    /// non-zero exit is still `Ok` with `success == false`.
    fn invoke(&self, request: &AgentRequest<'_>) -> Result<AgentReply>;
}

/// Agent that spawns an external command and writes the prompt to its stdin.
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    timeout: Option<Duration>,
    capture: Capture,
}

impl CommandAgent {
    pub fn new(command: &[String], workdir: impl Into<PathBuf>) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("agent command must not be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            workdir: workdir.into(),
            timeout: None,
            capture: Capture::limited(10_000_000),
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.capture.output_limit_bytes = bytes;
        self
    }

    /// Lines containing any of `markers` survive the output limit, so a sentinel
    /// printed after a flood of output still reaches the detector.
    pub fn with_markers(mut self, markers: Vec<String>) -> Self {
        self.capture.markers = markers;
        self
    }

    /// Mirror the agent's stdout and stderr lines to the given writers while it runs.
    pub fn with_echo(
        mut self,
        stdout: impl Write + Send + 'static,
        stderr: impl Write + Send + 'static,
    ) -> Self {
        self.capture.stdout_tee = Some(tee(stdout));
        self.capture.stderr_tee = Some(tee(stderr));
        self
    }
}

impl Agent for CommandAgent {
    #[instrument(skip_all, fields(iteration = request.iteration, program = %self.program))]
    fn invoke(&self, request: &AgentRequest<'_>) -> Result<AgentReply> {
        info!(workdir = %self.workdir.display(), "starting agent");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.workdir)
            .env("RALPH_TASK", request.task)
            .env("RALPH_STACK", request.stack)
            .env("RALPH_ITERATION", request.iteration.to_string());

        let output = run_command(
            cmd,
            Some(request.prompt.as_bytes()),
            self.timeout,
            &self.capture,
        )
        .with_context(|| format!("run agent {}", self.program))?;

        if output.timed_out {
            warn!(timeout = ?self.timeout, "agent timed out");
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent exited with failure");
        } else {
            debug!("agent completed successfully");
        }

        Ok(AgentReply {
            output: output.combined_text(),
            exit_code: output.status.code(),
            success: output.status.success() && !output.timed_out,
            timed_out: output.timed_out,
        })
    }
}
