//! Error taxonomy for portal automation.
//!
//! `AutomationError` is what callers see. `DriverError` is the narrower
//! failure type of the page-driver seam; the resolver and primitives lift it
//! into `AutomationError` once they know what was being attempted.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the automation core.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Caller input is invalid; no browser was opened.
    #[error("invalid automation request: {}", problems.join("; "))]
    Configuration { problems: Vec<String> },

    /// No usable browser binary. A human has to re-provision it.
    #[error("browser driver not found: {0}")]
    DriverNotFound(String),

    /// Every locator strategy for a required target was exhausted.
    #[error(
        "could not locate {description} with any of the {strategies_tried} locator strategies{}",
        last_error.as_ref().map(|e| format!(" (last error: {})", e)).unwrap_or_default()
    )]
    ElementNotFound {
        description: String,
        strategies_tried: usize,
        last_error: Option<String>,
        screenshot: Option<PathBuf>,
    },

    /// The target was found but interacting with it failed.
    #[error("failed to {action} {description}: {reason}")]
    Interaction {
        action: &'static str,
        description: String,
        reason: String,
    },

    /// An optional overlay or popup wait ran out. Always a warning.
    #[error("{what} did not settle within {}s", timeout.as_secs())]
    TransientUiTimeout { what: String, timeout: Duration },

    /// The operator did not finish a manual step in time.
    #[error("{step} was not completed within {}s", timeout.as_secs())]
    ManualStepTimeout { step: String, timeout: Duration },

    /// The browser died, was closed, or could not be launched.
    #[error("browser session error: {0}")]
    Session(String),
}

impl AutomationError {
    /// Stable name of the failure kind, used in final status events and
    /// JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::DriverNotFound(_) => "DriverProvisioningError",
            Self::ElementNotFound { .. } => "ElementNotFound",
            Self::Interaction { .. } => "InteractionFailed",
            Self::TransientUiTimeout { .. } => "TransientUiTimeout",
            Self::ManualStepTimeout { .. } => "ManualStepTimeout",
            Self::Session(_) => "SessionError",
        }
    }

    /// Screenshot captured while producing this error, if any.
    pub fn screenshot(&self) -> Option<&PathBuf> {
        match self {
            Self::ElementNotFound { screenshot, .. } => screenshot.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn configuration(problems: Vec<String>) -> Self {
        Self::Configuration { problems }
    }
}

/// Failures reported by a page driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The browser connection is gone. Never retried.
    #[error("browser disconnected: {0}")]
    Disconnected(String),

    /// The referenced element no longer exists in the DOM.
    #[error("element is stale: {0}")]
    Stale(String),

    /// The control is not a `<select>`.
    #[error("element is not a select control")]
    NotSelectable,

    /// Requested option index exceeds the option count.
    #[error("option index {index} out of range ({len} options)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Any other protocol or script failure.
    #[error("{0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether this error means the session itself is unusable.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match err {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                Self::Disconnected(err.to_string())
            }
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<DriverError> for AutomationError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Disconnected(reason) => Self::Session(reason),
            other => Self::Session(other.to_string()),
        }
    }
}
