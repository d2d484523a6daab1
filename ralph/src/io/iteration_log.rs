//! Iteration logging helpers for `.ralph/iterations/`.
//!
//! These are post-mortem artifacts. The loop itself never reads them back.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::signal::Signal;
use crate::core::types::IterationReport;

#[derive(Debug, Clone, Serialize)]
pub struct IterationMeta<'a> {
    pub run_id: &'a str,
    pub iter: u32,
    pub task: &'a str,
    pub stack: &'a str,
    pub signal: Signal,
    pub blocked: bool,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub error: Option<&'a str>,
    pub duration_ms: u64,
}

impl<'a> IterationMeta<'a> {
    pub fn from_report(
        run_id: &'a str,
        task: &'a str,
        stack: &'a str,
        report: &'a IterationReport,
    ) -> Self {
        Self {
            run_id,
            iter: report.iteration,
            task,
            stack,
            signal: report.signal,
            blocked: report.blocked,
            exit_code: report.exit_code,
            success: report.success,
            timed_out: report.timed_out,
            error: report.error.as_deref(),
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub output_path: PathBuf,
}

impl IterationPaths {
    pub fn new(iterations_dir: &Path, run_id: &str, iter: u32) -> Self {
        let dir = iterations_dir.join(run_id).join(iter.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            output_path: dir.join("output.log"),
        }
    }
}

/// Run id derived from the wall clock: unix seconds at run start.
pub fn new_run_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("run-{secs}")
}

pub fn write_iteration(
    iterations_dir: &Path,
    meta: &IterationMeta<'_>,
    output: &str,
) -> Result<IterationPaths> {
    let paths = IterationPaths::new(iterations_dir, meta.run_id, meta.iter);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, meta)?;
    write_text(&paths.output_path, output)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
