//! Test-only helpers: a scripted agent and a throwaway project directory.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::io::agent::{Agent, AgentReply, AgentRequest};
use crate::io::config::{RalphConfig, write_config};
use crate::io::init::RalphPaths;

/// One canned agent response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(AgentReply),
    /// The agent could not be invoked at all.
    Error(String),
}

impl ScriptedReply {
    pub fn output(text: &str) -> Self {
        Self::Reply(AgentReply::ok(text))
    }

    pub fn exit(code: i32, text: &str) -> Self {
        Self::Reply(AgentReply {
            output: text.to_string(),
            exit_code: Some(code),
            success: code == 0,
            timed_out: false,
        })
    }

    pub fn error(message: &str) -> Self {
        Self::Error(message.to_string())
    }
}

/// Owned copy of an [`AgentRequest`] for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub iteration: u32,
    pub task: String,
    pub stack: String,
    pub prompt: String,
}

/// Agent that replays queued replies in order. Once the queue is empty it keeps
/// answering with empty output.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.requests().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest<'_>) -> Result<AgentReply> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("scripted agent lock poisoned"))?
            .push(RecordedRequest {
                iteration: request.iteration,
                task: request.task.to_string(),
                stack: request.stack.to_string(),
                prompt: request.prompt.to_string(),
            });
        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow!("scripted agent lock poisoned"))?
            .pop_front();
        match next {
            Some(ScriptedReply::Reply(reply)) => Ok(reply),
            Some(ScriptedReply::Error(message)) => Err(anyhow!(message)),
            None => Ok(AgentReply::ok("")),
        }
    }
}

/// Temporary project directory with a `.ralph/config.toml`.
pub struct TestProject {
    dir: tempfile::TempDir,
}

impl TestProject {
    /// Project whose agent is `sh -c <script>` and whose loop never sleeps.
    pub fn with_script(script: &str) -> Result<Self> {
        let cfg = RalphConfig {
            delay_secs: 0,
            agent: crate::io::config::AgentConfig {
                command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            },
            ..RalphConfig::default()
        };
        Self::with_config(&cfg)
    }

    pub fn with_config(cfg: &RalphConfig) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        write_config(&RalphPaths::new(dir.path()).config_path, cfg)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> RalphPaths {
        RalphPaths::new(self.path())
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path().join(relative))?)
    }
}
