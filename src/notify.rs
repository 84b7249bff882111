//! Transient user notifications (toasts).

use std::fmt;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Default on-screen time for a toast.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(3_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Success,
    Info,
    Warning,
    Error,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Success => "success",
            Tone::Info => "info",
            Tone::Warning => "warning",
            Tone::Error => "error",
        }
    }

    pub fn default_icon(self) -> &'static str {
        match self {
            Tone::Success => "check-circle",
            Tone::Info => "info",
            Tone::Warning => "alert-triangle",
            Tone::Error => "x-circle",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub tone: Tone,
    pub icon: &'static str,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl Notification {
    pub fn new(message: impl Into<String>, tone: Tone, duration: Duration) -> Self {
        Self {
            message: message.into(),
            tone,
            icon: tone.default_icon(),
            duration,
        }
    }

    pub fn with_icon(mut self, icon: &'static str) -> Self {
        self.icon = icon;
        self
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_u64(duration.as_millis().min(u128::from(u64::MAX)) as u64)
}

/// Fire-and-forget notification output. Auto-dismissal after
/// `Notification::duration` is the sink's concern.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        let duration_ms = notification.duration.as_millis() as u64;
        match notification.tone {
            Tone::Error => tracing::error!(
                tone = %notification.tone,
                icon = notification.icon,
                duration_ms,
                "{}",
                notification.message
            ),
            Tone::Warning => tracing::warn!(
                tone = %notification.tone,
                icon = notification.icon,
                duration_ms,
                "{}",
                notification.message
            ),
            Tone::Success | Tone::Info => tracing::info!(
                tone = %notification.tone,
                icon = notification.icon,
                duration_ms,
                "{}",
                notification.message
            ),
        }
    }
}

/// Forwards notifications to a channel. Sends after the receiver is gone are
/// dropped silently.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }

    pub fn unbounded() -> (Self, Receiver<Notification>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}
