//! Crate-wide failure taxonomy.
//!
//! Every error the workflow can surface maps onto one of three kinds:
//! a collaborator was unreachable, session data broke an invariant, or
//! the process itself terminated (retries exhausted, human declined).
//! `FailureInfo` is the serializable record stored on a failed session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::{Checkpoint, OracleError, VerifierError};
use crate::services::concept_graph::GraphError;
use crate::services::scheduler::SchedulerError;
use crate::workflow::state::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CollaboratorUnavailable,
    DataInvariantViolation,
    ProcessTermination,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("verifier error: {0}")]
    Verifier(#[from] VerifierError),

    #[error("concept graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("step {expected:?} cannot run in phase {actual:?}")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("loop-back budget exhausted after {iterations} remediation rounds")]
    ExhaustedRetries { iterations: u32 },

    #[error("human declined checkpoint {0:?}")]
    CheckpointDeclined(Checkpoint),

    #[error("no assessment item available for objective {objective_id}")]
    NoItemAvailable { objective_id: String },

    #[error("no objectives available for an adaptive pass")]
    NoObjectives,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Oracle(_) | Self::Verifier(_) | Self::NoItemAvailable { .. } => {
                ErrorKind::CollaboratorUnavailable
            }
            Self::Graph(_)
            | Self::Scheduler(_)
            | Self::InvalidTransition { .. }
            | Self::WrongPhase { .. }
            | Self::NoObjectives => {
                ErrorKind::DataInvariantViolation
            }
            Self::ExhaustedRetries { .. } | Self::CheckpointDeclined(_) => {
                ErrorKind::ProcessTermination
            }
        }
    }
}

/// Snapshot of a terminal failure, kept on the session for post-mortems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub phase: Phase,
    pub kind: ErrorKind,
    pub detail: String,
}

impl FailureInfo {
    pub fn from_error(phase: Phase, error: &WorkflowError) -> Self {
        Self {
            phase,
            kind: error.kind(),
            detail: error.to_string(),
        }
    }
}
