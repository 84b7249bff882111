//! Step definitions and per-step validation results.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::FormState;

/// Field errors produced by one validation pass. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationResult {
    errors: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error for `field`. The first message recorded for a field
    /// wins so that "required" is not masked by a later format check.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_insert_with(|| message.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.errors.remove(field)
    }

    pub fn require_text(mut self, form: &FormState, field: &str, message: &str) -> Self {
        if form.text(field).is_none() {
            self.insert(field, message);
        }
        self
    }

    pub fn require_true(mut self, form: &FormState, field: &str, message: &str) -> Self {
        if !form.flag(field) {
            self.insert(field, message);
        }
        self
    }

    /// Requires a number strictly greater than zero.
    pub fn require_positive(mut self, form: &FormState, field: &str, message: &str) -> Self {
        match form.number(field) {
            Some(value) if value > 0.0 => {}
            _ => self.insert(field, message),
        }
        self
    }

    /// Requires a whole number strictly greater than zero.
    pub fn require_positive_integer(
        mut self,
        form: &FormState,
        field: &str,
        message: &str,
    ) -> Self {
        match form.number(field) {
            Some(value) if value > 0.0 && value.fract() == 0.0 => {}
            _ => self.insert(field, message),
        }
        self
    }

    pub fn require_one_of(
        mut self,
        form: &FormState,
        field: &str,
        allowed: &[&str],
        message: &str,
    ) -> Self {
        match form.text(field) {
            Some(value) if allowed.contains(&value.as_str()) => {}
            _ => self.insert(field, message),
        }
        self
    }

    /// Adds `message` for `field` when `failed` holds and the field has no
    /// error yet.
    pub fn check(mut self, failed: bool, field: &str, message: impl Into<String>) -> Self {
        if failed {
            self.insert(field, message);
        }
        self
    }
}

impl FromIterator<(String, String)> for ValidationResult {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

pub type StepValidator = dyn Fn(&FormState) -> ValidationResult + Send + Sync;

/// One ordered step of a wizard. Immutable once built.
#[derive(Clone)]
pub struct StepDefinition {
    id: String,
    label: String,
    validate: Arc<StepValidator>,
}

impl StepDefinition {
    pub fn new<F>(id: impl Into<String>, label: impl Into<String>, validate: F) -> Self
    where
        F: Fn(&FormState) -> ValidationResult + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            label: label.into(),
            validate: Arc::new(validate),
        }
    }

    /// A step that always validates (review/summary screens).
    pub fn always_valid(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, |_| ValidationResult::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn validate(&self, form: &FormState) -> ValidationResult {
        (self.validate)(form)
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_message_per_field_wins() {
        let form = FormState::from_value(json!({"amount": "abc"})).unwrap();
        let result = ValidationResult::new()
            .require_text(&form, "name", "Name is required")
            .check(true, "name", "Name is too short")
            .require_positive(&form, "amount", "Amount must be positive");

        assert_eq!(result.get("name"), Some("Name is required"));
        assert_eq!(result.get("amount"), Some("Amount must be positive"));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn integer_and_choice_rules() {
        let form = FormState::from_value(json!({
            "term": "12.5",
            "weeks": 8,
            "method": "cash",
            "other": "cheque",
        }))
        .unwrap();
        let result = ValidationResult::new()
            .require_positive_integer(&form, "term", "Term must be whole months")
            .require_positive_integer(&form, "weeks", "Weeks must be whole")
            .require_one_of(&form, "method", &["cash", "mobile_money"], "Pick a method")
            .require_one_of(&form, "other", &["cash"], "Pick a method");

        assert_eq!(result.get("term"), Some("Term must be whole months"));
        assert_eq!(result.get("weeks"), None);
        assert_eq!(result.get("method"), None);
        assert_eq!(result.get("other"), Some("Pick a method"));
    }

    #[test]
    fn step_runs_its_validator() {
        let step = StepDefinition::new("documents", "Documents", |form| {
            ValidationResult::new().require_true(form, "signed", "Sign first")
        });
        assert_eq!(step.id(), "documents");
        assert_eq!(step.label(), "Documents");
        assert!(!step.validate(&FormState::new()).is_valid());
        assert!(
            step.validate(&FormState::from_pairs([("signed", true)]))
                .is_valid()
        );
        assert!(
            StepDefinition::always_valid("review", "Review")
                .validate(&FormState::new())
                .is_valid()
        );
    }
}
