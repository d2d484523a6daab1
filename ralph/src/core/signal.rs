//! Sentinel detection over captured agent output.
//!
//! The loop only ever sees an [`Inspection`]. How the raw text is turned into one
//! is a [`Detector`] strategy, so brittle text matching stays out of the control
//! flow.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Completion sentinel the agent prints once the plan has no open work.
pub const COMPLETE_SENTINEL: &str = "RALPH_COMPLETE";
/// Marker the agent prints (and writes into the plan) when a task cannot proceed.
pub const BLOCKED_SENTINEL: &str = "[BLOCKED]";

/// Loop decision derived from one iteration's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Continue,
    Complete,
}

/// Everything the loop needs to know about one iteration's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    pub signal: Signal,
    /// Advisory only: never changes control flow.
    pub blocked: bool,
}

/// The pair of literal strings a detector looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pub complete: String,
    pub blocked: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            complete: COMPLETE_SENTINEL.to_string(),
            blocked: BLOCKED_SENTINEL.to_string(),
        }
    }
}

/// How sentinels are matched against output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Exact, case-sensitive substring anywhere in the output.
    #[default]
    Substring,
    /// Sentinel must stand alone on a line (surrounding whitespace ignored).
    Line,
}

/// Strategy for deriving an [`Inspection`] from raw output text.
pub trait Detector {
    fn inspect(&self, output: &str) -> Inspection;
}

/// Plain substring search.
#[derive(Debug, Clone)]
pub struct SubstringDetector {
    sentinels: Sentinels,
}

impl SubstringDetector {
    pub fn new(sentinels: Sentinels) -> Self {
        Self { sentinels }
    }
}

impl Detector for SubstringDetector {
    fn inspect(&self, output: &str) -> Inspection {
        inspection(
            output.contains(&self.sentinels.complete),
            output.contains(&self.sentinels.blocked),
        )
    }
}

/// Whole-line matching, so prompt text quoted back by the agent does not count.
#[derive(Debug, Clone)]
pub struct LineDetector {
    complete: Regex,
    blocked: Regex,
}

impl LineDetector {
    pub fn new(sentinels: &Sentinels) -> Result<Self> {
        Ok(Self {
            complete: line_regex(&sentinels.complete)?,
            blocked: line_regex(&sentinels.blocked)?,
        })
    }
}

impl Detector for LineDetector {
    fn inspect(&self, output: &str) -> Inspection {
        inspection(
            self.complete.is_match(output),
            self.blocked.is_match(output),
        )
    }
}

/// Build the detector for `mode`.
pub fn detector_for(mode: MatchMode, sentinels: Sentinels) -> Result<Box<dyn Detector>> {
    match mode {
        MatchMode::Substring => Ok(Box::new(SubstringDetector::new(sentinels))),
        MatchMode::Line => Ok(Box::new(LineDetector::new(&sentinels)?)),
    }
}

fn inspection(complete: bool, blocked: bool) -> Inspection {
    Inspection {
        signal: if complete {
            Signal::Complete
        } else {
            Signal::Continue
        },
        blocked,
    }
}

fn line_regex(sentinel: &str) -> Result<Regex> {
    let pattern = format!(r"(?m)^[ \t]*{}[ \t]*\r?$", regex::escape(sentinel));
    Regex::new(&pattern).with_context(|| format!("compile line pattern for {sentinel:?}"))
}
