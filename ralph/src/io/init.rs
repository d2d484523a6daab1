//! Initialization helpers for `.ralph/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::io::config::{RalphConfig, load_config, write_config};

const PLAN_TEMPLATE: &str = include_str!("templates/plan.md");
const GUIDANCE_TEMPLATE: &str = include_str!("templates/guidance.md");
const RALPH_GITIGNORE: &str = "iterations/\n*.tmp\n";

/// Canonical paths within a project root.
#[derive(Debug, Clone)]
pub struct RalphPaths {
    pub root: PathBuf,
    pub ralph_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
    pub iterations_dir: PathBuf,
}

impl RalphPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ralph_dir = root.join(".ralph");
        Self {
            root: root.clone(),
            ralph_dir: ralph_dir.clone(),
            config_path: ralph_dir.join("config.toml"),
            gitignore_path: ralph_dir.join(".gitignore"),
            iterations_dir: ralph_dir.join("iterations"),
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Overwrite existing config and documents.
    pub force: bool,
    /// Stack recorded as `default_stack`.
    pub stack: Option<String>,
}

/// Files written (or left alone) by `init_project`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Create `.ralph/` scaffolding plus the plan and guidance documents in `root`.
///
/// Fails if `.ralph/config.toml` already exists unless `options.force` is set.
/// Existing plan/guidance documents belong to the agent and are kept unless forced.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<InitOutcome> {
    let paths = RalphPaths::new(root);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "ralph init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    if paths.ralph_dir.exists() && !paths.ralph_dir.is_dir() {
        return Err(anyhow!("ralph init: .ralph exists but is not a directory"));
    }

    fs::create_dir_all(&paths.ralph_dir)
        .with_context(|| format!("create directory {}", paths.ralph_dir.display()))?;

    let mut cfg = RalphConfig::default();
    if let Some(stack) = &options.stack {
        cfg.default_stack = stack.clone();
    }
    write_config(&paths.config_path, &cfg)?;

    let mut outcome = InitOutcome {
        written: vec![paths.config_path.clone()],
        skipped: Vec::new(),
    };
    write_file(&paths.gitignore_path, RALPH_GITIGNORE)?;
    outcome.written.push(paths.gitignore_path.clone());

    for (path, contents) in [
        (root.join(&cfg.paths.plan), PLAN_TEMPLATE),
        (root.join(&cfg.paths.guidance), GUIDANCE_TEMPLATE),
    ] {
        if write_if_missing_or_force(&path, contents, options.force)? {
            outcome.written.push(path);
        } else {
            debug!(path = %path.display(), "keeping existing document");
            outcome.skipped.push(path);
        }
    }

    info!(root = %root.display(), stack = %cfg.default_stack, "initialized project");
    Ok(outcome)
}

/// Load the project config, honoring an explicit `--config` path.
pub fn load_project_config(root: &Path, explicit: Option<&Path>) -> Result<RalphConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("config file {} does not exist", path.display()));
            }
            load_config(path)
        }
        None => load_config(&RalphPaths::new(root).config_path),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_if_missing_or_force(path: &Path, contents: &str, force: bool) -> Result<bool> {
    if !force && path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    write_file(path, contents)?;
    Ok(true)
}
