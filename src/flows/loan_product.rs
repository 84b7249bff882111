//! Add Loan Product.

use serde_json::{Map, Value};

use crate::wizard::{FormState, StepDefinition, ValidationResult, coerce_number, number_value};

pub const DETAILS: &str = "details";
pub const LIMITS: &str = "limits";
pub const TIERS: &str = "tiers";

pub const INTEREST_METHODS: &[&str] = &["flat", "declining_balance"];

const NUMERIC_FIELDS: &[&str] = &[
    "interestRate",
    "minAmount",
    "maxAmount",
    "minTermMonths",
    "maxTermMonths",
];
const TIER_FIELDS: &[&str] = &["minAmount", "maxAmount", "rate"];

pub fn steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(DETAILS, "Product details", validate_details),
        StepDefinition::new(LIMITS, "Limits", validate_limits),
        StepDefinition::new(TIERS, "Rate tiers", validate_tiers),
    ]
}

fn is_rate(value: Option<f64>) -> bool {
    value.is_some_and(|rate| rate > 0.0 && rate <= 100.0)
}

pub fn validate_details(form: &FormState) -> ValidationResult {
    ValidationResult::new()
        .require_text(form, "productName", "Product name is required")
        .check(
            !is_rate(form.number("interestRate")),
            "interestRate",
            "Interest rate must be greater than 0 and at most 100",
        )
        .require_one_of(
            form,
            "interestMethod",
            INTEREST_METHODS,
            "Interest method must be flat or declining balance",
        )
}

pub fn validate_limits(form: &FormState) -> ValidationResult {
    let result = ValidationResult::new()
        .require_positive(form, "minAmount", "Minimum amount must be greater than 0")
        .require_positive(form, "maxAmount", "Maximum amount must be greater than 0")
        .require_positive_integer(
            form,
            "minTermMonths",
            "Minimum term must be a whole number of months",
        )
        .require_positive_integer(
            form,
            "maxTermMonths",
            "Maximum term must be a whole number of months",
        );

    let inverted = |min: &str, max: &str| match (form.number(min), form.number(max)) {
        (Some(min), Some(max)) => min > max,
        _ => false,
    };
    result
        .check(
            inverted("minAmount", "maxAmount"),
            "maxAmount",
            "Maximum amount must not be less than minimum amount",
        )
        .check(
            inverted("minTermMonths", "maxTermMonths"),
            "maxTermMonths",
            "Maximum term must not be less than minimum term",
        )
}

/// Tiers are optional. When present they must be ordered, must not
/// overlap, and must sit inside the product's amount limits. Only the first
/// problem is reported.
pub fn validate_tiers(form: &FormState) -> ValidationResult {
    let mut result = ValidationResult::new();
    let bounds = (form.number("minAmount"), form.number("maxAmount"));
    let mut previous_max: Option<f64> = None;

    for (index, tier) in form.list(TIERS).iter().enumerate() {
        if let Err(message) = check_tier(tier, previous_max, bounds) {
            result.insert(TIERS, format!("Tier {}: {message}", index + 1));
            break;
        }
        previous_max = tier.get("maxAmount").and_then(coerce_number);
    }
    result
}

fn check_tier(
    tier: &Value,
    previous_max: Option<f64>,
    (product_min, product_max): (Option<f64>, Option<f64>),
) -> Result<(), String> {
    let field = |key: &str| tier.get(key).and_then(coerce_number);
    let (Some(min), Some(max)) = (field("minAmount"), field("maxAmount")) else {
        return Err("minimum and maximum amounts must be numbers".to_string());
    };
    if !is_rate(field("rate")) {
        return Err("rate must be greater than 0 and at most 100".to_string());
    }
    if min >= max {
        return Err("minimum amount must be below maximum amount".to_string());
    }
    if previous_max.is_some_and(|prev| min < prev) {
        return Err("overlaps the previous tier".to_string());
    }
    if product_min.is_some_and(|limit| min < limit) || product_max.is_some_and(|limit| max > limit)
    {
        return Err("must lie within the product's amount limits".to_string());
    }
    Ok(())
}

/// Form fields with numeric-looking strings turned into numbers, tiers
/// included.
pub fn assemble(form: &FormState) -> Value {
    let mut payload = form.as_map().clone();
    coerce_fields(&mut payload, NUMERIC_FIELDS);
    if let Some(Value::Array(tiers)) = payload.get_mut(TIERS) {
        for tier in tiers.iter_mut() {
            if let Value::Object(fields) = tier {
                coerce_fields(fields, TIER_FIELDS);
            }
        }
    }
    Value::Object(payload)
}

pub(crate) fn coerce_fields(fields: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(value) = fields.get_mut(*key)
            && let Some(number) = coerce_number(value)
        {
            *value = number_value(number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits() -> FormState {
        FormState::from_pairs([
            ("minAmount", json!("1,000")),
            ("maxAmount", json!(50_000)),
            ("minTermMonths", json!("3")),
            ("maxTermMonths", json!(24)),
        ])
    }

    #[test]
    fn details_check_rate_range_and_method() {
        let form = FormState::from_pairs([
            ("productName", json!("Boda boda")),
            ("interestRate", json!("120")),
            ("interestMethod", json!("compound")),
        ]);
        let result = validate_details(&form);
        assert_eq!(result.len(), 2);
        assert!(result.get("interestRate").is_some());
        assert!(result.get("interestMethod").is_some());
    }

    #[test]
    fn limits_must_be_ordered() {
        assert!(validate_limits(&limits()).is_valid());

        let mut form = limits();
        form.patch(FormState::from_pairs([
            ("minAmount", json!(60_000)),
            ("maxTermMonths", json!(2.5)),
        ]));
        let result = validate_limits(&form);
        assert_eq!(
            result.get("maxAmount"),
            Some("Maximum amount must not be less than minimum amount")
        );
        assert_eq!(
            result.get("maxTermMonths"),
            Some("Maximum term must be a whole number of months")
        );
    }

    #[test]
    fn tiers_are_optional_but_must_not_overlap() {
        assert!(validate_tiers(&limits()).is_valid());

        let mut form = limits();
        form.patch(FormState::from_pairs([(
            "tiers",
            json!([
                {"minAmount": 1000, "maxAmount": 10000, "rate": 12},
                {"minAmount": "9000", "maxAmount": 20000, "rate": 10},
            ]),
        )]));
        assert_eq!(
            validate_tiers(&form).get("tiers"),
            Some("Tier 2: overlaps the previous tier")
        );

        form.patch(FormState::from_pairs([(
            "tiers",
            json!([{"minAmount": 1000, "maxAmount": 90000, "rate": 12}]),
        )]));
        assert_eq!(
            validate_tiers(&form).get("tiers"),
            Some("Tier 1: must lie within the product's amount limits")
        );
    }

    #[test]
    fn assemble_coerces_numbers_inside_tiers() {
        let mut form = limits();
        form.patch(FormState::from_pairs([
            ("interestRate", json!("12.5")),
            ("productName", json!("Salary advance")),
            (
                "tiers",
                json!([{"minAmount": "1000", "maxAmount": "5,000", "rate": "9.5"}]),
            ),
        ]));
        let payload = assemble(&form);
        assert_eq!(payload["minAmount"], json!(1000));
        assert_eq!(payload["minTermMonths"], json!(3));
        assert_eq!(payload["interestRate"], json!(12.5));
        assert_eq!(payload["productName"], json!("Salary advance"));
        assert_eq!(
            payload["tiers"],
            json!([{"minAmount": 1000, "maxAmount": 5000, "rate": 9.5}])
        );
    }
}
