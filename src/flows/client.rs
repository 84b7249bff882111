//! Add/Edit Client.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::wizard::{FormState, StepDefinition, ValidationResult};

pub const PROFILE: &str = "profile";
pub const GUARANTOR: &str = "guarantor";
pub const DOCUMENTS: &str = "documents";

const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 9..=15;

pub fn steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(PROFILE, "Profile", validate_profile),
        StepDefinition::new(GUARANTOR, "Guarantor", validate_guarantor),
        StepDefinition::new(DOCUMENTS, "Documents", validate_documents),
    ]
}

pub fn validate_profile(form: &FormState) -> ValidationResult {
    let digits = form
        .text("phoneNumber")
        .map(|phone| phone.chars().filter(char::is_ascii_digit).count());
    ValidationResult::new()
        .require_text(form, "surname", "Surname is required")
        .require_text(form, "givenName", "Given name is required")
        .require_text(form, "phoneNumber", "Phone number is required")
        .check(
            digits.is_some_and(|count| !PHONE_DIGITS.contains(&count)),
            "phoneNumber",
            "Phone number must have 9 to 15 digits",
        )
}

pub fn validate_guarantor(form: &FormState) -> ValidationResult {
    ValidationResult::new()
        .require_text(form, "guarantorName", "Guarantor name is required")
        .require_text(form, "guarantorContact", "Guarantor contact is required")
}

pub fn validate_documents(form: &FormState) -> ValidationResult {
    ValidationResult::new().require_true(
        form,
        "agreementSigned",
        "Client must sign the agreement forms before proceeding",
    )
}

/// Form fields plus `fullName` and an `updatedAt` stamp in UTC.
pub fn assemble(form: &FormState, now: OffsetDateTime) -> Value {
    let mut payload = form.as_map().clone();
    payload.insert("fullName".to_string(), Value::String(full_name(form)));
    if let Ok(stamp) = now.to_offset(UtcOffset::UTC).format(&Rfc3339) {
        payload.insert("updatedAt".to_string(), Value::String(stamp));
    }
    Value::Object(payload)
}

fn full_name(form: &FormState) -> String {
    [form.text("givenName"), form.text("surname")]
        .into_iter()
        .flatten()
        .flat_map(|part| {
            part.split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
