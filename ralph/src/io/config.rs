//! Ralph configuration stored under `.ralph/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::signal::{BLOCKED_SENTINEL, COMPLETE_SENTINEL, MatchMode, Sentinels};
use crate::core::stacks::{DEFAULT_STACK, StackCatalog, StackProfile};

/// Ralph configuration (TOML).
///
/// Edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    /// Iteration budget when `ralph run` is not given one.
    pub max_iterations: u32,

    /// Flat pause between iterations, in seconds.
    pub delay_secs: u64,

    /// Per-invocation wall-clock limit. Unset means wait for the agent indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_timeout_secs: Option<u64>,

    /// Keep at most this many bytes of each agent output stream.
    pub output_limit_bytes: usize,

    /// Stack selector used when `ralph run` is not given one.
    pub default_stack: String,

    /// Write `.ralph/iterations/<run>/<iter>/` artifacts.
    pub write_iteration_logs: bool,

    pub agent: AgentConfig,
    pub sentinels: SentinelConfig,
    pub paths: PathsConfig,

    /// Extra or replacement stacks, keyed by selector.
    pub stacks: BTreeMap<String, StackProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent argv. The rendered prompt is written to its stdin.
    pub command: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "claude".to_string(),
                "-p".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SentinelConfig {
    pub complete: String,
    pub blocked: String,
    pub match_mode: MatchMode,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            complete: COMPLETE_SENTINEL.to_string(),
            blocked: BLOCKED_SENTINEL.to_string(),
            match_mode: MatchMode::Substring,
        }
    }
}

impl SentinelConfig {
    pub fn sentinels(&self) -> Sentinels {
        Sentinels {
            complete: self.complete.clone(),
            blocked: self.blocked.clone(),
        }
    }
}

/// Locations of the agent-owned documents, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub plan: PathBuf,
    pub guidance: PathBuf,
    /// Custom minijinja prompt template replacing the built-in one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plan: PathBuf::from("IMPLEMENTATION_PLAN.md"),
            guidance: PathBuf::from("AGENTS.md"),
            prompt_template: None,
        }
    }
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            delay_secs: 2,
            agent_timeout_secs: None,
            output_limit_bytes: 10_000_000,
            default_stack: DEFAULT_STACK.to_string(),
            write_iteration_logs: true,
            agent: AgentConfig::default(),
            sentinels: SentinelConfig::default(),
            paths: PathsConfig::default(),
            stacks: BTreeMap::new(),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.agent_timeout_secs == Some(0) {
            return Err(anyhow!("agent_timeout_secs must be > 0 when set"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.sentinels.complete.is_empty() {
            return Err(anyhow!("sentinels.complete must not be empty"));
        }
        if self.sentinels.blocked.is_empty() {
            return Err(anyhow!("sentinels.blocked must not be empty"));
        }
        if [&self.sentinels.complete, &self.sentinels.blocked]
            .iter()
            .any(|s| s.contains('\n'))
        {
            return Err(anyhow!("sentinels must be single-line"));
        }
        if self.sentinels.complete == self.sentinels.blocked {
            return Err(anyhow!("sentinels.complete and sentinels.blocked must differ"));
        }
        self.stack_catalog()
            .resolve(&self.default_stack)
            .context("default_stack")?;
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn agent_timeout(&self) -> Option<Duration> {
        self.agent_timeout_secs.map(Duration::from_secs)
    }

    /// Built-in stacks merged with `[stacks.*]`.
    pub fn stack_catalog(&self) -> StackCatalog {
        StackCatalog::with_overrides(&self.stacks)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
