#![forbid(unsafe_code)]

pub mod api;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod flows;
pub mod notify;
mod paths;
pub mod realtime;
pub mod telemetry;
pub mod wizard;

pub use error::{Effect, Error, Result, Transience};

// Common entry points at crate root
pub use crate::flows::Flow;
pub use crate::notify::{ChannelSink, Notification, NotificationSink, Tone, TracingSink};
pub use crate::realtime::{
    BridgeConfig, BridgeHandle, EventEnvelope, RealtimeBridge, StompTransport,
};
pub use crate::wizard::{
    FormState, StepDefinition, StepOutcome, ValidationResult, Wizard, WizardError,
    WizardSnapshot,
};
