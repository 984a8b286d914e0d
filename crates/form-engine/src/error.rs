//! Error types shared across the engine.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::stages::Stage;

/// Structural problems that abort nesting or flattening of a page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("component id '{0}' is declared more than once")]
    DuplicateId(String),
    #[error("component '{parent}' references missing child '{child}'")]
    MissingChild { parent: String, child: String },
    #[error("component '{child}' is claimed by both '{first}' and '{second}'")]
    DuplicateClaim {
        child: String,
        first: String,
        second: String,
    },
    #[error("circular child reference: {}", cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },
    #[error("failed to parse layout: {0}")]
    Parse(String),
}

/// Why a claimed child could not be attached to the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClaimErrorKind {
    MissingChild,
    DuplicateClaim,
    CrossPage,
    Circular,
    DuplicateNodeId,
}

impl ClaimErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimErrorKind::MissingChild => "missing_child",
            ClaimErrorKind::DuplicateClaim => "duplicate_claim",
            ClaimErrorKind::CrossPage => "cross_page",
            ClaimErrorKind::Circular => "circular",
            ClaimErrorKind::DuplicateNodeId => "duplicate_node_id",
        }
    }
}

/// A claim error reported during hierarchy generation. These never abort
/// generation; the affected component is left out of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimError {
    pub kind: ClaimErrorKind,
    pub page: String,
    pub parent: Option<String>,
    pub child: String,
    pub message: String,
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.page, self.message)
    }
}

/// Misuse of the stage scheduler by its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(
        "hook '{hook}' registered for stage {stage} after the pipeline finished; \
         node generation must not continue once every stage has completed"
    )]
    RegisteredAfterFinish { stage: Stage, hook: String },
}

/// Errors surfaced by a full resolution cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("failed to parse config: {0}")]
    Config(#[source] serde_json::Error),
}
