use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::realtime::{BridgeError, TransportError};
use crate::wizard::WizardError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred on the server.
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the per-module errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    Cli(#[from] crate::cli::CliError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Wizard(e) => e.transience(),
            Error::Api(e) => e.transience(),
            Error::Transport(e) => e.transience(),
            Error::Bridge(e) => e.transience(),
            Error::Config(_) => Transience::Permanent,
            #[cfg(feature = "cli")]
            Error::Cli(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Api(e) => e.effect(),
            Error::Wizard(WizardError::SubmitFailed { .. }) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
