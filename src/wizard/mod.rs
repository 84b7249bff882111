//! Multi-step form wizard with per-step validation gating.
//!
//! A wizard owns one [`FormState`] for its lifetime and walks an ordered list
//! of [`StepDefinition`]s:
//! - `next()` validates the current step and only moves forward when it
//!   passes
//! - `previous()` and `go_to_step()` move unconditionally
//! - `submit()` hands the raw form to a caller-supplied function, guarded
//!   against re-entrancy, and leaves the form untouched on failure

mod engine;
mod form;
mod step;

use thiserror::Error;

use crate::error::Transience;

pub use engine::{StepOutcome, SubmitNotices, Wizard, WizardSnapshot};
pub use form::{FormState, coerce_number, number_value};
pub use step::{StepDefinition, StepValidator, ValidationResult};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum WizardError {
    #[error("a wizard needs at least one step")]
    NoSteps,

    #[error("duplicate step id `{id}`")]
    DuplicateStepId { id: String },

    #[error("form data must be a JSON object, got {found}")]
    FormNotObject { found: &'static str },

    #[error("step {index} out of range (wizard has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("already on the first step")]
    AtFirstStep,

    #[error("submit is only available on the last step (current {current}, last {last})")]
    NotOnFinalStep { current: usize, last: usize },

    #[error("a submission is already in progress")]
    SubmitInProgress,

    #[error("step `{step}` has {} invalid field(s)", errors.len())]
    Invalid {
        step: String,
        errors: ValidationResult,
    },

    #[error("submission failed: {message}")]
    SubmitFailed { message: String },
}

impl WizardError {
    pub fn transience(&self) -> Transience {
        match self {
            WizardError::SubmitInProgress => Transience::Retryable,
            WizardError::SubmitFailed { .. } => Transience::Unknown,
            WizardError::NoSteps
            | WizardError::DuplicateStepId { .. }
            | WizardError::FormNotObject { .. }
            | WizardError::StepOutOfRange { .. }
            | WizardError::AtFirstStep
            | WizardError::NotOnFinalStep { .. }
            | WizardError::Invalid { .. } => Transience::Permanent,
        }
    }
}
