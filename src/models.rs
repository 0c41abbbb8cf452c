//! Data models for portal automation requests, status events and outcomes.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::AutomationError;

/// Date format used by the portal's ledger date fields.
pub const LEDGER_DATE_FORMAT: &str = "%d-%m-%Y";

/// Financial year options, in the order the Returns Dashboard lists them.
pub const FINANCIAL_YEARS: [&str; 8] = [
    "2025-26", "2024-25", "2023-24", "2022-23", "2021-22", "2020-21", "2019-20", "2018-19",
];

/// Quarter options for the Returns Dashboard.
pub const QUARTERS: [&str; 4] = [
    "Quarter 1 (Apr-Jun)",
    "Quarter 2 (Jul-Sep)",
    "Quarter 3 (Oct-Dec)",
    "Quarter 4 (Jan-Mar)",
];

/// Period (month) options for the Returns Dashboard.
pub const PERIODS: [&str; 12] = [
    "April", "May", "June", "July", "August", "September", "October", "November", "December",
    "January", "February", "March",
];

pub const DEFAULT_FINANCIAL_YEAR_INDEX: i32 = 0;
pub const DEFAULT_QUARTER_INDEX: i32 = 1;
pub const DEFAULT_PERIOD_INDEX: i32 = 4;

/// GST portal credentials for one client.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub client_name: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        client_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// All three fields non-empty after trimming.
    pub fn is_valid(&self) -> bool {
        self.problems().is_empty()
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.client_name.trim().is_empty() {
            problems.push("Client name cannot be empty".to_string());
        }
        if self.username.trim().is_empty() {
            problems.push("Username cannot be empty".to_string());
        }
        if self.password.trim().is_empty() {
            problems.push("Password cannot be empty".to_string());
        }
        problems
    }
}

// Password stays out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_name", &self.client_name)
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client: {}, Username: {}", self.client_name, self.username)
    }
}

/// Which portal actions to perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    #[serde(default)]
    pub just_login: bool,
    #[serde(default)]
    pub returns_dashboard: bool,
    #[serde(default)]
    pub download_report: bool,
    #[serde(default)]
    pub access_credit_ledger: bool,
    #[serde(default)]
    pub access_cash_ledger: bool,
}

impl ActionSet {
    pub fn any(&self) -> bool {
        self.just_login
            || self.returns_dashboard
            || self.download_report
            || self.access_credit_ledger
            || self.access_cash_ledger
    }

    pub fn requires_returns_dashboard(&self) -> bool {
        self.returns_dashboard || self.download_report
    }
}

/// Zero-based indices into the Returns Dashboard dropdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnsFilterOptions {
    pub year_index: i32,
    pub quarter_index: i32,
    pub month_index: i32,
}

impl Default for ReturnsFilterOptions {
    fn default() -> Self {
        Self {
            year_index: DEFAULT_FINANCIAL_YEAR_INDEX,
            quarter_index: DEFAULT_QUARTER_INDEX,
            month_index: DEFAULT_PERIOD_INDEX,
        }
    }
}

impl ReturnsFilterOptions {
    fn problems(&self) -> Vec<String> {
        [
            index_problem("Financial Year index", self.year_index, FINANCIAL_YEARS.len()),
            index_problem("Quarter index", self.quarter_index, QUARTERS.len()),
            index_problem("Month index", self.month_index, PERIODS.len()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Check that `index` addresses one of `len` options.
pub fn validate_index(field: &str, index: i32, len: usize) -> Result<usize, AutomationError> {
    match index_problem(field, index, len) {
        Some(problem) => Err(AutomationError::configuration(vec![problem])),
        None => Ok(index as usize),
    }
}

fn index_problem(field: &str, index: i32, len: usize) -> Option<String> {
    if index < 0 {
        Some(format!("{} cannot be negative", field))
    } else if index as usize >= len {
        Some(format!(
            "{} ({}) is out of range (0 to {})",
            field,
            index,
            len.saturating_sub(1)
        ))
    } else {
        None
    }
}

/// From/To dates for the Electronic Credit Ledger, as typed into the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDateRange {
    pub from_date: String,
    pub to_date: String,
}

impl Default for LedgerDateRange {
    fn default() -> Self {
        let today = Local::now().format(LEDGER_DATE_FORMAT).to_string();
        Self {
            from_date: today.clone(),
            to_date: today,
        }
    }
}

impl LedgerDateRange {
    pub fn new(from_date: impl Into<String>, to_date: impl Into<String>) -> Self {
        Self {
            from_date: from_date.into(),
            to_date: to_date.into(),
        }
    }

    /// Parse both dates and check `from <= to`.
    pub fn parse(&self) -> Result<(NaiveDate, NaiveDate), AutomationError> {
        let from = parse_date("From Date", &self.from_date);
        let to = parse_date("To Date", &self.to_date);
        match (from, to) {
            (Ok(from), Ok(to)) if from > to => Err(AutomationError::configuration(vec![
                "From Date cannot be later than To Date".to_string(),
            ])),
            (Ok(from), Ok(to)) => Ok((from, to)),
            (from, to) => Err(AutomationError::configuration(
                [from.err(), to.err()].into_iter().flatten().collect(),
            )),
        }
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    NaiveDate::parse_from_str(value, LEDGER_DATE_FORMAT)
        .map_err(|_| format!("{} '{}' is invalid. Expected format: DD-MM-YYYY", field, value))
}

/// Everything a caller asks one automation run to do.
#[derive(Debug, Clone)]
pub struct AutomationRequest {
    pub credentials: Credentials,
    pub actions: ActionSet,
    pub returns_filter: ReturnsFilterOptions,
    pub ledger_dates: LedgerDateRange,
    /// Leave the browser open after the run. The session is then the
    /// caller's to close.
    pub keep_open: bool,
}

impl AutomationRequest {
    pub fn new(credentials: Credentials, actions: ActionSet) -> Self {
        Self {
            credentials,
            actions,
            returns_filter: ReturnsFilterOptions::default(),
            ledger_dates: LedgerDateRange::default(),
            keep_open: false,
        }
    }

    /// Promote `download_report` to also require the Returns Dashboard.
    pub fn normalize(&mut self) {
        if self.actions.download_report {
            self.actions.returns_dashboard = true;
        }
    }

    /// Collect every input problem. Options only matter for the actions
    /// that use them.
    pub fn validate(&self) -> Result<(), AutomationError> {
        let mut problems = self.credentials.problems();

        if !self.actions.any() {
            problems.push("At least one action must be selected".to_string());
        }
        if self.actions.requires_returns_dashboard() {
            problems.extend(self.returns_filter.problems());
        }
        if self.actions.access_credit_ledger {
            if let Err(AutomationError::Configuration { problems: date_problems }) =
                self.ledger_dates.parse()
            {
                problems.extend(date_problems);
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AutomationError::configuration(problems))
        }
    }

    /// Normalize then validate.
    pub fn prepare(mut self) -> Result<Self, AutomationError> {
        self.normalize();
        self.validate()?;
        Ok(self)
    }
}

/// Severity of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        };
        f.write_str(label)
    }
}

/// Human-readable progress message streamed to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub message: String,
    pub level: StatusLevel,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    /// Step that failed (e.g. "login")
    pub step: String,
    /// Failure kind, see [`AutomationError::kind`]
    pub kind: String,
    pub message: String,
}

/// Result of one automation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub success: bool,
    /// Last state reached
    pub final_state: String,
    /// States reached, in order
    pub visited: Vec<String>,
    #[serde(default)]
    pub failure: Option<RunFailure>,
    /// Debug screenshot taken on failure
    #[serde(default)]
    pub screenshot: Option<PathBuf>,
    /// Browser left open at the caller's request
    pub session_retained: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("Acme Traders", "acme_gst", "s3cret!")
    }

    #[test]
    fn test_credentials_validity_trims() {
        assert!(creds().is_valid());
        assert!(!Credentials::new("Acme", "   ", "pw").is_valid());
        assert!(!Credentials::new("", "user", "pw").is_valid());
        assert!(!Credentials::new("Acme", "user", "\t").is_valid());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?} {}", creds(), creds());
        assert!(!rendered.contains("s3cret!"));
        assert!(rendered.contains("acme_gst"));
    }

    #[test]
    fn test_download_report_promotes_dashboard() {
        let mut request = AutomationRequest::new(
            creds(),
            ActionSet {
                download_report: true,
                ..Default::default()
            },
        );
        request.normalize();
        assert!(request.actions.returns_dashboard);

        let once = request.actions;
        request.normalize();
        assert_eq!(request.actions, once);
    }

    #[test]
    fn test_no_action_selected_is_rejected() {
        let request = AutomationRequest::new(creds(), ActionSet::default());
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("At least one action"));
    }

    #[test]
    fn test_date_range_order() {
        assert!(LedgerDateRange::new("31-12-2024", "01-01-2024").parse().is_err());
        assert!(LedgerDateRange::new("15-06-2024", "15-06-2024").parse().is_ok());
        assert!(LedgerDateRange::new("01-04-2024", "31-03-2025").parse().is_ok());
    }

    #[test]
    fn test_date_range_reports_both_bad_dates() {
        let err = LedgerDateRange::new("not-a-date", "").parse().unwrap_err();
        match err {
            AutomationError::Configuration { problems } => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_default_date_range_is_today() {
        let range = LedgerDateRange::default();
        assert_eq!(range.from_date, range.to_date);
        assert!(range.parse().is_ok());
    }

    #[test]
    fn test_financial_year_index_bounds() {
        assert_eq!(FINANCIAL_YEARS.len(), 8);
        assert_eq!(validate_index("Financial Year index", 7, FINANCIAL_YEARS.len()).unwrap(), 7);
        assert!(validate_index("Financial Year index", 8, FINANCIAL_YEARS.len()).is_err());
        assert!(validate_index("Financial Year index", -1, FINANCIAL_YEARS.len()).is_err());
    }

    #[test]
    fn test_filter_indices_only_checked_for_dashboard() {
        let mut request = AutomationRequest::new(
            creds(),
            ActionSet {
                access_cash_ledger: true,
                ..Default::default()
            },
        );
        request.returns_filter.month_index = 40;
        assert!(request.clone().prepare().is_ok());

        request.actions.returns_dashboard = true;
        let err = request.prepare().unwrap_err();
        assert!(err.to_string().contains("Month index (40) is out of range (0 to 11)"));
    }

    #[test]
    fn test_credit_ledger_rejects_bad_date() {
        let mut request = AutomationRequest::new(
            creds(),
            ActionSet {
                access_credit_ledger: true,
                ..Default::default()
            },
        );
        request.ledger_dates = LedgerDateRange::new("not-a-date", "01-01-2024");
        let err = request.prepare().unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[test]
    fn test_status_level_serializes_uppercase() {
        let event = StatusEvent::new(StatusLevel::Success, "done");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "SUCCESS");
        assert_eq!(json["message"], "done");
    }
}
