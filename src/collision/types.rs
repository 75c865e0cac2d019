//! Probe result types.

use crate::store::CollisionSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a collision check for one name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollisionInfo {
    /// No present record holds the name.
    NoCollision,
    /// A present record holds the name.
    Found { existing: CollisionSummary },
    /// The name could not be checked. Treat as a possible collision and show
    /// `warning` alongside any overwrite decision.
    Degraded { warning: String },
}

impl CollisionInfo {
    pub fn degraded(warning: impl Into<String>) -> Self {
        Self::Degraded {
            warning: warning.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Whether an upload of this name is known to be new.
    ///
    /// Only `NoCollision` qualifies; a degraded result never does.
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::NoCollision)
    }

    pub fn existing(&self) -> Option<&CollisionSummary> {
        match self {
            Self::Found { existing } => Some(existing),
            _ => None,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Degraded { warning } => Some(warning),
            _ => None,
        }
    }
}

/// Probe results keyed by name.
pub type CollisionMap = BTreeMap<String, CollisionInfo>;
