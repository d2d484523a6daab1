//! Stack selectors: verification commands and commit prefixes per project stack.
//!
//! Stacks are plain data. The prompt template and the loop are parameterized over
//! a [`StackProfile`] instead of carrying one copy of the instructions per stack.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Selector used when neither the CLI nor config names a stack.
pub const DEFAULT_STACK: &str = "full";

/// Verification and commit conventions for one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackProfile {
    /// Selector as typed on the command line.
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Commands the agent must run (and pass) before committing.
    #[serde(default)]
    pub verify: Vec<String>,
    /// Allowed commit-message prefixes.
    #[serde(default)]
    pub commit_prefixes: Vec<String>,
}

impl StackProfile {
    fn builtin(name: &str, description: &str, verify: &[&str], commit_prefixes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            verify: verify.iter().map(|s| s.to_string()).collect(),
            commit_prefixes: commit_prefixes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

const PHOENIX_VERIFY: &[&str] = &[
    "mix compile --warnings-as-errors",
    "mix format --check-formatted",
    "mix credo --strict",
    "mix test",
];
const REACT_VERIFY: &[&str] = &[
    "npx tsc --noEmit",
    "npx eslint . --max-warnings 0",
    "npm test -- --watchAll=false",
    "npm run build",
];
const EXPO_VERIFY: &[&str] = &[
    "npx tsc --noEmit",
    "npx eslint . --max-warnings 0",
    "npx expo-doctor",
    "npm test -- --watchAll=false",
];

/// All selectable stacks, keyed by selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackCatalog {
    profiles: BTreeMap<String, StackProfile>,
}

impl StackCatalog {
    /// Catalog with the built-in stacks only.
    pub fn builtin() -> Self {
        let full_verify: Vec<&str> = PHOENIX_VERIFY
            .iter()
            .chain(REACT_VERIFY)
            .chain(EXPO_VERIFY.iter().filter(|cmd| cmd.contains("expo")))
            .copied()
            .collect();
        let profiles = [
            StackProfile::builtin(
                DEFAULT_STACK,
                "Phoenix backend with React web and Expo mobile clients",
                &full_verify,
                &["feat:", "fix:", "refactor:", "test:", "chore:", "docs:"],
            ),
            StackProfile::builtin(
                "phoenix",
                "Elixir/Phoenix backend",
                PHOENIX_VERIFY,
                &["feat(api):", "fix(api):", "refactor(api):", "test(api):"],
            ),
            StackProfile::builtin(
                "react",
                "React + TypeScript web client",
                REACT_VERIFY,
                &["feat(web):", "fix(web):", "refactor(web):", "test(web):"],
            ),
            StackProfile::builtin(
                "expo",
                "Expo / React Native mobile client",
                EXPO_VERIFY,
                &["feat(mobile):", "fix(mobile):", "refactor(mobile):", "test(mobile):"],
            ),
        ];
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.name.clone(), profile))
                .collect(),
        }
    }

    /// Built-ins merged with configured stacks. A configured stack with a built-in
    /// name replaces it wholesale.
    pub fn with_overrides(overrides: &BTreeMap<String, StackProfile>) -> Self {
        let mut catalog = Self::builtin();
        for (name, profile) in overrides {
            let mut profile = profile.clone();
            profile.name = name.clone();
            catalog.profiles.insert(name.clone(), profile);
        }
        catalog
    }

    /// Resolve a selector, failing with the list of known selectors.
    pub fn resolve(&self, selector: &str) -> Result<&StackProfile> {
        self.profiles.get(selector).ok_or_else(|| {
            anyhow!(
                "unknown stack {selector:?} (known: {})",
                self.names().collect::<Vec<_>>().join(", ")
            )
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &StackProfile> {
        self.profiles.values()
    }
}
