//! Task requirement contracts.
//!
//! A requirement is the discriminated description of what a task needs the
//! executor to accomplish; the planner façade routes on its kind. Two
//! requirements are equivalent iff their kind matches and the kind-specific
//! identity fields match.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Discriminated requirement variants routed by the planner façade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskRequirement {
    Collect {
        patterns: Vec<String>,
        quantity: u32,
    },
    Mine {
        patterns: Vec<String>,
        quantity: u32,
    },
    Craft {
        output_pattern: String,
        quantity: u32,
        #[serde(default)]
        proxy_patterns: Vec<String>,
    },
    ToolProgression {
        target_tool: String,
        tool_type: String,
        target_tier: String,
        quantity: u32,
    },
    Build {
        structure: String,
        quantity: u32,
    },
    Navigate {
        destination: String,
        tolerance: f64,
        quantity: u32,
    },
    Explore {
        target: String,
        max_steps: u32,
        quantity: u32,
    },
    Find {
        target: String,
        quantity: u32,
    },
}

impl TaskRequirement {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Collect { .. } => "collect",
            Self::Mine { .. } => "mine",
            Self::Craft { .. } => "craft",
            Self::ToolProgression { .. } => "tool_progression",
            Self::Build { .. } => "build",
            Self::Navigate { .. } => "navigate",
            Self::Explore { .. } => "explore",
            Self::Find { .. } => "find",
        }
    }

    /// Whether two requirements target the same work.
    ///
    /// Kind must match, then the kind-specific identity fields: pattern sets
    /// for collect/mine, output pattern for craft, structure for build,
    /// target tool for tool progression, destination for navigate, target
    /// for explore/find. Quantities and tuning fields are not identity.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Collect { patterns: a, .. },
                Self::Collect { patterns: b, .. },
            )
            | (Self::Mine { patterns: a, .. }, Self::Mine { patterns: b, .. }) => {
                pattern_set(a) == pattern_set(b)
            }
            (
                Self::Craft {
                    output_pattern: a, ..
                },
                Self::Craft {
                    output_pattern: b, ..
                },
            ) => a == b,
            (
                Self::ToolProgression { target_tool: a, .. },
                Self::ToolProgression { target_tool: b, .. },
            ) => a == b,
            (Self::Build { structure: a, .. }, Self::Build { structure: b, .. }) => a == b,
            (
                Self::Navigate { destination: a, .. },
                Self::Navigate { destination: b, .. },
            ) => a == b,
            (Self::Explore { target: a, .. }, Self::Explore { target: b, .. })
            | (Self::Find { target: a, .. }, Self::Find { target: b, .. }) => a == b,
            _ => false,
        }
    }
}

fn pattern_set(patterns: &[String]) -> BTreeSet<&str> {
    patterns.iter().map(String::as_str).collect()
}
