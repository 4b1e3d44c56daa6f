//! Adaptive certification-study orchestration.
//!
//! The crate drives a student session through diagnosis, concept-graph
//! construction, verified planning, tutoring, and re-assessment, looping
//! back on failed assessments up to a hard cap. External capabilities
//! (question generation, documentation checks, catalog data,
//! notifications, the human in the loop) are injected through the traits
//! in [`collaborators`].

pub mod collaborators;
pub mod config;
pub mod error;
pub mod logging;
pub mod services;
pub mod workflow;

pub use config::Config;
pub use error::{ErrorKind, FailureInfo, WorkflowError};
pub use workflow::state::{Phase, SessionState};
pub use workflow::SessionWorkflow;
