//! Add Loan.

use serde_json::Value;
use time::Date;
use time::macros::format_description;

use crate::wizard::{FormState, StepDefinition, ValidationResult};

use super::loan_product::coerce_fields;

pub const BORROWER: &str = "borrower";
pub const TERMS: &str = "terms";
pub const DISBURSEMENT: &str = "disbursement";

pub const DISBURSEMENT_METHODS: &[&str] = &["cash", "bank_transfer", "mobile_money"];

const NUMERIC_FIELDS: &[&str] = &[
    "principal",
    "termMonths",
    "productMinAmount",
    "productMaxAmount",
];

pub fn steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(BORROWER, "Borrower", validate_borrower),
        StepDefinition::new(TERMS, "Loan terms", validate_terms),
        StepDefinition::new(DISBURSEMENT, "Disbursement", validate_disbursement),
    ]
}

pub fn validate_borrower(form: &FormState) -> ValidationResult {
    ValidationResult::new().require_text(form, "clientId", "Select a client")
}

pub fn validate_terms(form: &FormState) -> ValidationResult {
    let principal = form.number("principal");
    let below = principal
        .zip(form.number("productMinAmount"))
        .is_some_and(|(principal, min)| principal < min);
    let above = principal
        .zip(form.number("productMaxAmount"))
        .is_some_and(|(principal, max)| principal > max);

    ValidationResult::new()
        .require_text(form, "productId", "Select a loan product")
        .require_positive(form, "principal", "Principal must be greater than 0")
        .require_positive_integer(
            form,
            "termMonths",
            "Term must be a whole number of months",
        )
        .check(
            below || above,
            "principal",
            "Principal is outside the product's amount limits",
        )
}

pub fn validate_disbursement(form: &FormState) -> ValidationResult {
    let date_ok = form.text("disbursementDate").is_some_and(|raw| parse_date(&raw).is_some());
    ValidationResult::new()
        .check(
            !date_ok,
            "disbursementDate",
            "Disbursement date must be a valid date (YYYY-MM-DD)",
        )
        .require_one_of(
            form,
            "disbursementMethod",
            DISBURSEMENT_METHODS,
            "Choose cash, bank transfer or mobile money",
        )
}

pub fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).ok()
}

pub fn assemble(form: &FormState) -> Value {
    let mut payload = form.as_map().clone();
    coerce_fields(&mut payload, NUMERIC_FIELDS);
    Value::Object(payload)
}
