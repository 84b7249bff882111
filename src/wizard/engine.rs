//! Wizard run state and navigation.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::notify::{DEFAULT_TOAST_DURATION, Notification, NotificationSink, Tone};

use super::{FormState, StepDefinition, ValidationResult, WizardError};

/// Result of a `next()` call. Validation failures are data, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advanced { from: usize, to: usize },
    Blocked(ValidationResult),
    /// The last step validated; the caller should route to `submit()`.
    ReadyToSubmit,
}

impl StepOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, StepOutcome::Blocked(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WizardSnapshot {
    pub current_step: usize,
    pub step_id: String,
    pub completed_steps: BTreeSet<usize>,
    /// Errors of the step currently displayed.
    pub errors: ValidationResult,
    pub is_submitting: bool,
    pub form: FormState,
}

/// Messages raised through the notifier around `submit()`.
#[derive(Debug, Clone)]
pub struct SubmitNotices {
    pub success: Option<String>,
    pub duration: Duration,
}

impl Default for SubmitNotices {
    fn default() -> Self {
        Self {
            success: None,
            duration: DEFAULT_TOAST_DURATION,
        }
    }
}

struct RunState {
    form: FormState,
    current: usize,
    completed: BTreeSet<usize>,
    /// One error slot per step, indexed like `steps`.
    errors: Vec<ValidationResult>,
    submitting: bool,
}

/// Shared wizard handle. Clones observe and drive the same run state.
#[derive(Clone)]
pub struct Wizard {
    steps: Arc<[StepDefinition]>,
    state: Arc<Mutex<RunState>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    notices: SubmitNotices,
}

impl Wizard {
    pub fn new(steps: Vec<StepDefinition>, initial: FormState) -> Result<Self, WizardError> {
        if steps.is_empty() {
            return Err(WizardError::NoSteps);
        }
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.id()) {
                return Err(WizardError::DuplicateStepId {
                    id: step.id().to_string(),
                });
            }
        }

        let errors = vec![ValidationResult::new(); steps.len()];
        Ok(Self {
            steps: steps.into(),
            state: Arc::new(Mutex::new(RunState {
                form: initial,
                current: 0,
                completed: BTreeSet::new(),
                errors,
                submitting: false,
            })),
            notifier: None,
            notices: SubmitNotices::default(),
        })
    }

    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn NotificationSink>,
        notices: SubmitNotices,
    ) -> Self {
        self.notifier = Some(notifier);
        self.notices = notices;
        self
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn current_step(&self) -> usize {
        self.lock().current
    }

    pub fn current_step_definition(&self) -> &StepDefinition {
        let index = self.current_step();
        &self.steps[index]
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step() + 1 == self.steps.len()
    }

    pub fn form(&self) -> FormState {
        self.lock().form.clone()
    }

    /// Errors of the currently displayed step.
    pub fn errors(&self) -> ValidationResult {
        let state = self.lock();
        state.errors[state.current].clone()
    }

    pub fn step_errors(&self, index: usize) -> Result<ValidationResult, WizardError> {
        self.check_index(index)?;
        Ok(self.lock().errors[index].clone())
    }

    pub fn completed_steps(&self) -> BTreeSet<usize> {
        self.lock().completed.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.lock().submitting
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        let state = self.lock();
        WizardSnapshot {
            current_step: state.current,
            step_id: self.steps[state.current].id().to_string(),
            completed_steps: state.completed.clone(),
            errors: state.errors[state.current].clone(),
            is_submitting: state.submitting,
            form: state.form.clone(),
        }
    }

    /// Shallow-merge into the form. Edited fields lose their current error
    /// until the next validation pass.
    pub fn patch(&self, partial: FormState) {
        let mut state = self.lock();
        let written = state.form.patch(partial);
        for slot in state.errors.iter_mut() {
            for key in &written {
                slot.remove(key);
            }
        }
    }

    /// Validate `index` against the current form and replace that step's
    /// error slot with the result.
    pub fn validate_step(&self, index: usize) -> Result<ValidationResult, WizardError> {
        self.check_index(index)?;
        let mut state = self.lock();
        let result = self.steps[index].validate(&state.form);
        state.errors[index] = result.clone();
        Ok(result)
    }

    pub fn next(&self) -> StepOutcome {
        let mut state = self.lock();
        let from = state.current;
        let result = self.steps[from].validate(&state.form);
        if !result.is_valid() {
            tracing::debug!(
                step = self.steps[from].id(),
                invalid = result.len(),
                "wizard step blocked"
            );
            state.errors[from] = result.clone();
            return StepOutcome::Blocked(result);
        }

        state.errors[from] = ValidationResult::new();
        if from + 1 == self.steps.len() {
            return StepOutcome::ReadyToSubmit;
        }

        state.completed.insert(from);
        state.current = from + 1;
        // The step landed on shows no errors until it is validated again.
        state.errors[from + 1] = ValidationResult::new();
        StepOutcome::Advanced { from, to: from + 1 }
    }

    pub fn previous(&self) -> Result<usize, WizardError> {
        let mut state = self.lock();
        if state.current == 0 {
            return Err(WizardError::AtFirstStep);
        }
        state.current -= 1;
        Ok(state.current)
    }

    /// Tab-bar jump. Never validates.
    pub fn go_to_step(&self, index: usize) -> Result<(), WizardError> {
        self.check_index(index)?;
        self.lock().current = index;
        Ok(())
    }

    /// Validate the last step and hand a copy of the form to `submit_fn`.
    ///
    /// A second call while one is running returns `SubmitInProgress` without
    /// invoking its function. On failure the form and current step are left
    /// exactly as they were.
    pub fn submit<T, E, F>(&self, submit_fn: F) -> Result<T, WizardError>
    where
        F: FnOnce(FormState) -> Result<T, E>,
        E: fmt::Display,
    {
        let payload = {
            let mut state = self.lock();
            if state.submitting {
                return Err(WizardError::SubmitInProgress);
            }
            let last = self.steps.len() - 1;
            if state.current != last {
                return Err(WizardError::NotOnFinalStep {
                    current: state.current,
                    last,
                });
            }
            let result = self.steps[last].validate(&state.form);
            state.errors[last] = result.clone();
            if !result.is_valid() {
                return Err(WizardError::Invalid {
                    step: self.steps[last].id().to_string(),
                    errors: result,
                });
            }
            state.submitting = true;
            state.form.clone()
        };

        let guard = SubmittingGuard { state: &self.state };
        let outcome = submit_fn(payload);
        drop(guard);

        match outcome {
            Ok(value) => {
                self.lock().completed.insert(self.steps.len() - 1);
                if let Some(message) = &self.notices.success {
                    self.raise(message.clone(), Tone::Success);
                }
                Ok(value)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!("wizard submission failed: {message}");
                self.raise(message.clone(), Tone::Error);
                Err(WizardError::SubmitFailed { message })
            }
        }
    }

    fn raise(&self, message: String, tone: Tone) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(Notification::new(message, tone, self.notices.duration));
        }
    }

    fn check_index(&self, index: usize) -> Result<(), WizardError> {
        if index >= self.steps.len() {
            return Err(WizardError::StepOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Wizard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Wizard")
            .field("steps", &self.steps)
            .field("current", &state.current)
            .field("completed", &state.completed)
            .field("submitting", &state.submitting)
            .finish_non_exhaustive()
    }
}

/// Clears `submitting` on every exit path, unwinding included.
struct SubmittingGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .submitting = false;
    }
}
