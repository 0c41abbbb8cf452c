//! GST portal automation over the Chrome DevTools Protocol.
//!
//! Logs into the GST portal (the operator solves the CAPTCHA), then runs the
//! selected actions: Returns Dashboard filtering, GSTR-2B download and ledger
//! navigation. Page lookups go through ordered fallback strategies so one
//! changed selector does not break a run.

pub mod browser;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod portal;
pub mod service;
pub mod session;
pub mod status;

#[cfg(test)]
mod testing;

pub use config::AutomationConfig;
pub use credentials::{CredentialSource, JsonCredentialFile};
pub use error::{AutomationError, DriverError};
pub use models::{
    ActionSet, AutomationRequest, Credentials, LedgerDateRange, ReturnsFilterOptions, RunFailure,
    RunOutcome, StatusEvent, StatusLevel,
};
pub use service::{AutomationService, RunHandle};
pub use session::{SessionInfo, SessionManager};
pub use status::{NullSink, StatusSink};
