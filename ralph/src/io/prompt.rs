//! Prompt rendering for agent input.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::signal::Sentinels;
use crate::core::stacks::StackProfile;

const ITERATION_TEMPLATE: &str = include_str!("prompts/iteration.md");
const TEMPLATE_NAME: &str = "iteration";

/// Stack context for template rendering.
#[derive(Debug, Clone, Serialize)]
struct StackContext<'a> {
    name: &'a str,
    description: &'a str,
    verify: &'a [String],
    commit_prefixes: &'a [String],
}

impl<'a> StackContext<'a> {
    fn from_profile(profile: &'a StackProfile) -> Self {
        Self {
            name: &profile.name,
            description: &profile.description,
            verify: &profile.verify,
            commit_prefixes: &profile.commit_prefixes,
        }
    }
}

/// Everything a prompt template can refer to.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub task: &'a str,
    pub stack: &'a StackProfile,
    pub plan_path: &'a Path,
    pub guidance_path: &'a Path,
    pub sentinels: &'a Sentinels,
    pub max_iterations: u32,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Engine using the built-in iteration template.
    pub fn new() -> Result<Self> {
        Self::from_source(ITERATION_TEMPLATE.to_string())
    }

    /// Engine using a user-provided template file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("read prompt template {}", path.display()))?;
        Self::from_source(source)
            .with_context(|| format!("load prompt template {}", path.display()))
    }

    fn from_source(source: String) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source)
            .context("parse prompt template")?;
        Ok(Self { env })
    }

    pub fn render(&self, input: &PromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = template
            .render(context! {
                task => input.task.trim(),
                stack => StackContext::from_profile(input.stack),
                plan_path => input.plan_path.display().to_string(),
                guidance_path => input.guidance_path.display().to_string(),
                complete => &input.sentinels.complete,
                blocked => &input.sentinels.blocked,
                max_iterations => input.max_iterations,
            })
            .context("render prompt template")?;
        debug!(bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}

/// Render with the built-in template, or the file at `template` when given.
pub fn render_prompt(template: Option<&Path>, input: &PromptInputs<'_>) -> Result<String> {
    let engine = match template {
        Some(path) => PromptEngine::from_file(path)?,
        None => PromptEngine::new()?,
    };
    engine.render(input)
}
