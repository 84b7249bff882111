//! Human renderer for CLI outputs.
//!
//! Pure formatting; handlers gather whatever data they print.

use serde_json::Value;

use super::CheckReport;
use crate::notify::{Notification, Tone};
use crate::realtime::BridgeStats;

pub fn render_check(report: &CheckReport) -> String {
    if report.ready {
        return format!("✓ {}: ready to submit", report.flow);
    }
    let mut out = format!(
        "✗ {}: blocked at step {} ({})",
        report.flow,
        report.step_index + 1,
        report.label
    );
    for (field, message) in report.errors.errors() {
        out.push_str(&format!("\n  {field}: {message}"));
    }
    out
}

pub fn render_notification(notification: &Notification) -> String {
    let marker = match notification.tone {
        Tone::Success => "✓",
        Tone::Info => "•",
        Tone::Warning => "!",
        Tone::Error => "✗",
    };
    format!(
        "{marker} [{}] {}",
        notification.tone, notification.message
    )
}

/// Created/updated record: its id when the API returned one, else the
/// whole body.
pub fn render_response(response: &Value) -> String {
    match response.get("id") {
        Some(Value::String(id)) => format!("saved {id}"),
        Some(Value::Number(id)) => format!("saved {id}"),
        _ if response.is_null() => "saved".to_string(),
        _ => serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string()),
    }
}

pub fn render_stats(stats: &BridgeStats) -> String {
    format!(
        "{} events delivered, {} malformed dropped, {} connection attempts",
        stats.delivered, stats.malformed, stats.connect_attempts
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::ValidationResult;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn blocked_report_lists_field_errors() {
        let mut errors = ValidationResult::new();
        errors.insert("surname", "Surname is required");
        let report = CheckReport {
            flow: "client".into(),
            ready: false,
            step_index: 0,
            step: "profile".into(),
            label: "Profile".into(),
            completed_steps: Vec::new(),
            errors,
        };
        assert_eq!(
            render_check(&report),
            "✗ client: blocked at step 1 (Profile)\n  surname: Surname is required"
        );
    }

    #[test]
    fn notification_shows_tone() {
        let toast = Notification::new("Payment recorded", Tone::Success, Duration::from_secs(3));
        assert_eq!(render_notification(&toast), "✓ [success] Payment recorded");
    }

    #[test]
    fn response_prefers_id() {
        assert_eq!(render_response(&json!({"id": 42, "fullName": "Jane Doe"})), "saved 42");
        assert_eq!(render_response(&Value::Null), "saved");
    }
}
