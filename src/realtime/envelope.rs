//! Inbound event envelopes and their notification styling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::notify::Tone;

/// Decoded body of one pub/sub message.
///
/// `action` is a dot-separated event name (`payment.recorded`). Every other
/// field of the object is kept in `payload` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("body is not valid utf-8 json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("body is json but not an object")]
    NotAnObject,
}

pub fn decode_envelope(body: &[u8]) -> Result<EventEnvelope, DecodeError> {
    let value: Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}

/// `(action, tone, icon)`
const ACTION_STYLES: &[(&str, Tone, &str)] = &[
    ("payment.recorded", Tone::Success, "cash"),
    ("payment.reversed", Tone::Warning, "rotate-ccw"),
    ("payment.failed", Tone::Error, "x-circle"),
    ("loan.created", Tone::Info, "file-plus"),
    ("loan.approved", Tone::Success, "check-circle"),
    ("loan.rejected", Tone::Error, "slash"),
    ("loan.disbursed", Tone::Success, "send"),
    ("loan.closed", Tone::Info, "archive"),
    ("loan_product.created", Tone::Success, "package"),
    ("loan_product.updated", Tone::Info, "edit"),
    ("loan_product.deleted", Tone::Warning, "trash"),
    ("client.created", Tone::Success, "user-plus"),
    ("client.updated", Tone::Info, "user"),
    ("expense.recorded", Tone::Info, "receipt"),
];

const FALLBACK_TONE: Tone = Tone::Info;
const FALLBACK_ICON: &str = "bell";

/// Tone and icon for an action. Unknown actions get the fallback style.
pub fn style_for(action: &str) -> (Tone, &'static str) {
    ACTION_STYLES
        .iter()
        .find(|(name, _, _)| *name == action)
        .map(|&(_, tone, icon)| (tone, icon))
        .unwrap_or((FALLBACK_TONE, FALLBACK_ICON))
}

impl EventEnvelope {
    pub fn tone(&self) -> Tone {
        style_for(&self.action).0
    }

    /// Text shown to the user: the server message, or the action spelled
    /// out when the server sent none.
    pub fn display_message(&self) -> String {
        if let Some(message) = self.message.as_deref()
            && !message.trim().is_empty()
        {
            return message.trim().to_string();
        }
        if self.action.is_empty() {
            return "update received".to_string();
        }
        self.action.replace(['.', '_'], " ")
    }
}
