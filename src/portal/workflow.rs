//! The GST portal workflow: login, Returns Dashboard filtering, GSTR-2B
//! download and ledger navigation, run strictly in that order.
//!
//! Each step decides locally what is optional (overlays, popups, the export
//! trigger, ledger dates) and downgrades those failures to warnings.
//! Anything else ends the run in [`WorkflowState::Failed`].

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

use crate::browser::{Actions, PageDriver};
use crate::config::{pause, AutomationConfig};
use crate::error::AutomationError;
use crate::models::{
    validate_index, AutomationRequest, Credentials, LedgerDateRange, ReturnsFilterOptions,
    FINANCIAL_YEARS, PERIODS, QUARTERS,
};
use crate::status::StatusReporter;

/// Where a run has got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowState {
    Init,
    LoggedIn,
    DashboardFiltered,
    ReportDownloaded,
    CreditLedgerViewed,
    CashLedgerViewed,
    Failed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One selectable unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Login,
    ReturnsDashboard,
    DownloadReport,
    CreditLedger,
    CashLedger,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::ReturnsDashboard => "returns_dashboard",
            Self::DownloadReport => "download_report",
            Self::CreditLedger => "credit_ledger",
            Self::CashLedger => "cash_ledger",
        }
    }

    /// Human summary used by dry runs.
    pub fn describe(&self, request: &AutomationRequest) -> String {
        match self {
            Self::Login => format!(
                "Log in as {} (manual CAPTCHA)",
                request.credentials.username
            ),
            Self::ReturnsDashboard => {
                let filter = &request.returns_filter;
                format!(
                    "Open Returns Dashboard and filter: year {}, quarter {}, period {}",
                    option_label(&FINANCIAL_YEARS, filter.year_index),
                    option_label(&QUARTERS, filter.quarter_index),
                    option_label(&PERIODS, filter.month_index),
                )
            }
            Self::DownloadReport => "Generate and download the GSTR-2B Excel file".to_string(),
            Self::CreditLedger => format!(
                "Open Electronic Credit Ledger for {} to {}",
                request.ledger_dates.from_date, request.ledger_dates.to_date
            ),
            Self::CashLedger => "Open Electronic Cash Ledger balance details".to_string(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn option_label(options: &[&str], index: i32) -> String {
    usize::try_from(index)
        .ok()
        .and_then(|i| options.get(i))
        .map(|label| label.to_string())
        .unwrap_or_else(|| format!("#{}", index))
}

/// Steps a request selects, in execution order. Login always runs.
pub fn plan(request: &AutomationRequest) -> Vec<Step> {
    let actions = &request.actions;
    let mut steps = vec![Step::Login];
    if actions.requires_returns_dashboard() {
        steps.push(Step::ReturnsDashboard);
    }
    if actions.download_report {
        steps.push(Step::DownloadReport);
    }
    if actions.access_credit_ledger {
        steps.push(Step::CreditLedger);
    }
    if actions.access_cash_ledger {
        steps.push(Step::CashLedger);
    }
    steps
}

/// A step that ended the run.
#[derive(Debug)]
pub struct WorkflowFailure {
    pub step: Step,
    pub error: AutomationError,
    pub screenshot: Option<PathBuf>,
}

/// Runs the selected steps against one page.
pub struct Workflow<D: PageDriver> {
    actions: Actions<D>,
    config: Arc<AutomationConfig>,
    reporter: StatusReporter,
    state: WorkflowState,
    visited: Vec<WorkflowState>,
}

impl<D: PageDriver> Workflow<D> {
    pub fn new(driver: D, config: Arc<AutomationConfig>, reporter: StatusReporter) -> Self {
        let screenshot_dir = config
            .screenshots_on_error
            .then(|| config.download_dir.clone());
        Self {
            actions: Actions::new(driver, config.timeouts.poll_interval, screenshot_dir),
            config,
            reporter,
            state: WorkflowState::Init,
            visited: vec![WorkflowState::Init],
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// States reached so far, in order.
    pub fn visited(&self) -> &[WorkflowState] {
        &self.visited
    }

    fn transition(&mut self, next: WorkflowState) {
        tracing::debug!("Workflow state {} -> {}", self.state, next);
        self.state = next;
        self.visited.push(next);
    }

    /// Run every step `request` selects. Stops at the first fatal failure.
    pub async fn run(&mut self, request: &AutomationRequest) -> Result<(), WorkflowFailure> {
        for step in plan(request) {
            if let Err(error) = self.run_step(step, request).await {
                return Err(self.fail(step, error).await);
            }
        }

        let actions = &request.actions;
        if actions.just_login && plan(request).len() == 1 {
            self.reporter
                .info("Action: Just Login selected. Automation will stop here.");
        }
        Ok(())
    }

    async fn run_step(
        &mut self,
        step: Step,
        request: &AutomationRequest,
    ) -> Result<(), AutomationError> {
        let span = tracing::info_span!("step", name = step.name());
        async {
            match step {
                Step::Login => self.login(&request.credentials).await,
                Step::ReturnsDashboard => {
                    self.filter_returns_dashboard(&request.returns_filter).await
                }
                Step::DownloadReport => self.download_report().await,
                Step::CreditLedger => self.open_credit_ledger(&request.ledger_dates).await,
                Step::CashLedger => self.open_cash_ledger().await,
            }
        }
        .instrument(span)
        .await
    }

    async fn fail(&mut self, step: Step, error: AutomationError) -> WorkflowFailure {
        tracing::error!("Step {} failed: {}", step, error);
        self.reporter.error(format!("Error during {}: {}", step, error));

        let screenshot = match error.screenshot() {
            Some(path) => Some(path.clone()),
            // Nothing to capture from a dead browser.
            None if self.actions.driver().is_alive() => {
                self.actions
                    .capture_screenshot(&format!("{}_error", step.name()))
                    .await
            }
            None => None,
        };
        self.transition(WorkflowState::Failed);
        WorkflowFailure {
            step,
            error,
            screenshot,
        }
    }

    async fn login(&mut self, credentials: &Credentials) -> Result<(), AutomationError> {
        let config = self.config.clone();
        let timeouts = &config.timeouts;
        let locators = &config.locators;

        self.reporter.info("Navigating to GST portal...");
        self.actions.navigate(&config.portal.base_url).await?;
        self.reporter.info("Successfully navigated to GST portal");

        self.actions.click(&locators.login_link, timeouts.long).await?;
        self.reporter.info("Clicked on Login link.");
        self.wait_for_overlay().await?;

        self.actions
            .send_keys(&locators.username_field, &credentials.username, true, timeouts.long)
            .await?;
        self.reporter.info("Entered username");
        self.actions
            .send_keys(&locators.password_field, &credentials.password, true, timeouts.short)
            .await?;
        self.reporter.info("Entered password");

        self.wait_for_overlay().await?;
        self.actions.click(&locators.captcha_field, timeouts.long).await?;
        self.reporter.warning(format!(
            "IMPORTANT: Please enter the CAPTCHA in the browser and click Login. You have {} seconds.",
            timeouts.manual_captcha.as_secs()
        ));

        let logged_in = self
            .actions
            .wait_for_url_contains(&config.portal.welcome_url_fragment, timeouts.manual_captcha)
            .await?;
        if !logged_in {
            return Err(AutomationError::ManualStepTimeout {
                step: "CAPTCHA entry and login".to_string(),
                timeout: timeouts.manual_captcha,
            });
        }
        self.reporter
            .success("Login successful. Navigated to welcome page.");

        self.dismiss_post_login_popup().await?;
        self.transition(WorkflowState::LoggedIn);
        Ok(())
    }

    /// A lingering overlay is only a warning.
    async fn wait_for_overlay(&self) -> Result<(), AutomationError> {
        let timeout = self.config.timeouts.short;
        self.reporter
            .info("Waiting for page overlay to disappear (if any)...");
        if self
            .actions
            .wait_for_invisible(&self.config.locators.loading_overlay, timeout)
            .await?
        {
            self.reporter.info("Overlay cleared");
        } else {
            let warning = AutomationError::TransientUiTimeout {
                what: "Page overlay".to_string(),
                timeout,
            };
            self.reporter
                .warning(format!("{} - proceeding anyway", warning));
        }
        Ok(())
    }

    async fn dismiss_post_login_popup(&self) -> Result<(), AutomationError> {
        let settle = &self.config.settle;
        pause(settle.post_login).await;
        if self
            .actions
            .try_click(&self.config.locators.post_login_popup, self.config.timeouts.short)
            .await?
        {
            self.reporter.info("Closed post-login popup");
            pause(settle.popup_dismissed).await;
        } else {
            self.reporter
                .info("No post-login popup found (this is normal)");
        }
        Ok(())
    }

    async fn filter_returns_dashboard(
        &mut self,
        filter: &ReturnsFilterOptions,
    ) -> Result<(), AutomationError> {
        let config = self.config.clone();
        let (timeouts, settle, locators) = (&config.timeouts, &config.settle, &config.locators);

        let year = validate_index("Financial Year index", filter.year_index, FINANCIAL_YEARS.len())?;
        let quarter = validate_index("Quarter index", filter.quarter_index, QUARTERS.len())?;
        let month = validate_index("Month index", filter.month_index, PERIODS.len())?;

        self.reporter.info("Navigating to Returns Dashboard...");
        self.actions
            .click(&locators.returns_dashboard_button, timeouts.long)
            .await?;
        self.reporter.info("Clicked Returns Dashboard button.");
        pause(settle.dashboard_load).await;

        self.reporter.info("Applying filters on Returns Dashboard...");
        self.reporter.info("Waiting for dropdowns to initialize...");
        pause(settle.dropdown_init).await;

        let selections = [
            (&locators.financial_year_select, year, "Financial Year", FINANCIAL_YEARS[year]),
            (&locators.quarter_select, quarter, "Quarter", QUARTERS[quarter]),
            (&locators.period_select, month, "Period", PERIODS[month]),
        ];
        for (set, index, label, option) in selections {
            self.actions
                .select_dropdown_option(set, index, timeouts.long)
                .await?;
            self.reporter
                .info(format!("Selected {}: {} (index: {})", label, option, index));
            pause(settle.between_selects).await;
        }

        self.actions.click(&locators.search_button, timeouts.short).await?;
        self.reporter.info("Clicked Search button on Returns Dashboard");
        pause(settle.after_search).await;

        self.transition(WorkflowState::DashboardFiltered);
        Ok(())
    }

    async fn download_report(&mut self) -> Result<(), AutomationError> {
        let config = self.config.clone();
        let (timeouts, settle, locators) = (&config.timeouts, &config.settle, &config.locators);

        self.reporter.info("Attempting to download GSTR-2B...");
        if self
            .actions
            .try_click(&locators.offline_download_button, timeouts.short)
            .await?
        {
            self.reporter.info("Clicked GSTR-2B 'Download' button");
            pause(settle.after_export_trigger).await;
        } else {
            self.reporter
                .warning("Initial download button not found - trying file generation directly");
        }

        self.actions
            .click(&locators.generate_excel_button, timeouts.very_long)
            .await?;
        self.reporter
            .info("Clicked 'GENERATE EXCEL FILE TO DOWNLOAD' button");
        self.reporter.info(format!(
            "GSTR-2B Excel download should start. Check {}",
            config.download_dir.display()
        ));
        pause(settle.download).await;

        self.transition(WorkflowState::ReportDownloaded);
        Ok(())
    }

    /// Services menu, then hover Ledgers to open its flyout.
    async fn open_ledgers_menu(&self) -> Result<(), AutomationError> {
        let (timeouts, locators) = (&self.config.timeouts, &self.config.locators);

        self.actions.click(&locators.services_menu, timeouts.short).await?;
        self.reporter.info("Clicked 'Services' menu");
        pause(self.config.settle.menu_open).await;

        self.actions.hover(&locators.ledgers_submenu, timeouts.short).await?;
        self.reporter.info("Hovered over 'Ledgers' submenu");
        Ok(())
    }

    async fn open_credit_ledger(&mut self, dates: &LedgerDateRange) -> Result<(), AutomationError> {
        let config = self.config.clone();
        let (timeouts, settle, locators) = (&config.timeouts, &config.settle, &config.locators);

        self.reporter.info("Navigating to Electronic Credit Ledger...");
        self.open_ledgers_menu().await?;

        self.actions
            .click(&locators.credit_ledger_link, timeouts.long)
            .await?;
        self.reporter
            .info("Clicked 'Electronic Credit Ledger' from hover menu");

        self.actions
            .click(&locators.credit_ledger_detail_link, timeouts.long)
            .await?;
        self.reporter
            .info("Clicked detailed 'Electronic Credit Ledger' link");
        pause(settle.ledger_page).await;

        match self.set_ledger_dates(dates).await {
            Ok(()) => {}
            Err(err @ AutomationError::Session(_)) => return Err(err),
            Err(err) => {
                self.reporter
                    .warning(format!("Could not set credit ledger dates: {}", err));
                self.reporter
                    .warning("Date setting failed - you may need to set dates manually");
                if !settle.manual_date_entry.is_zero() {
                    self.reporter.info(format!(
                        "Waiting {} seconds for manual date entry...",
                        settle.manual_date_entry.as_secs()
                    ));
                    pause(settle.manual_date_entry).await;
                }
            }
        }

        self.transition(WorkflowState::CreditLedgerViewed);
        Ok(())
    }

    async fn set_ledger_dates(&self, dates: &LedgerDateRange) -> Result<(), AutomationError> {
        let (timeouts, settle, locators) = (
            &self.config.timeouts,
            &self.config.settle,
            &self.config.locators,
        );

        self.reporter.info(format!(
            "Setting credit ledger dates: From {} To {}",
            dates.from_date, dates.to_date
        ));

        for (set, value, label) in [
            (&locators.ledger_from_date, &dates.from_date, "From Date"),
            (&locators.ledger_to_date, &dates.to_date, "To Date"),
        ] {
            self.actions.send_keys(set, value, true, timeouts.short).await?;
            self.reporter.info(format!("Entered '{}': {}", label, value));
            // Close the date picker
            self.actions.execute_script("document.body.click();").await?;
            pause(settle.date_picker).await;
        }

        self.actions
            .click(&locators.ledger_go_button, timeouts.short)
            .await?;
        self.reporter
            .info("Clicked 'GO' button for credit ledger dates");
        pause(settle.ledger_page).await;
        Ok(())
    }

    async fn open_cash_ledger(&mut self) -> Result<(), AutomationError> {
        let config = self.config.clone();
        let (timeouts, settle, locators) = (&config.timeouts, &config.settle, &config.locators);

        self.reporter.info("Navigating to Electronic Cash Ledger...");
        self.open_ledgers_menu().await?;

        self.actions
            .click(&locators.cash_ledger_link, timeouts.long)
            .await?;
        self.reporter
            .info("Clicked 'Electronic Cash Ledger' from hover menu");
        pause(settle.ledger_page).await;

        self.actions
            .click(&locators.cash_balance_details, timeouts.long)
            .await?;
        self.reporter
            .info("Clicked link to view cash ledger balance details");
        pause(settle.balance_modal).await;

        self.transition(WorkflowState::CashLedgerViewed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionSet, StatusEvent, StatusLevel};
    use crate::portal::PortalLocators;
    use crate::testing::{fast_config, scripted_portal, ScriptedElement, ScriptedPage};
    use std::sync::Mutex;
    use std::time::Duration;

    fn request(actions: ActionSet) -> AutomationRequest {
        AutomationRequest::new(Credentials::new("Acme", "acme_gst", "pw"), actions)
            .prepare()
            .unwrap()
    }

    fn workflow(
        page: &ScriptedPage,
        dir: &tempfile::TempDir,
    ) -> (Workflow<ScriptedPage>, Arc<Mutex<Vec<StatusEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter = StatusReporter::new(Arc::new(move |e: &StatusEvent| {
            sink.lock().unwrap().push(e.clone())
        }));
        let config = Arc::new(fast_config(dir.path()));
        (Workflow::new(page.clone(), config, reporter), events)
    }

    #[test]
    fn test_plan_order_and_promotion() {
        let req = request(ActionSet {
            access_cash_ledger: true,
            access_credit_ledger: true,
            download_report: true,
            ..Default::default()
        });
        assert_eq!(
            plan(&req),
            vec![
                Step::Login,
                Step::ReturnsDashboard,
                Step::DownloadReport,
                Step::CreditLedger,
                Step::CashLedger
            ]
        );
        let just_login = request(ActionSet {
            just_login: true,
            ..Default::default()
        });
        assert_eq!(plan(&just_login), vec![Step::Login]);
    }

    #[test]
    fn test_describe_uses_option_labels() {
        let req = request(ActionSet {
            returns_dashboard: true,
            ..Default::default()
        });
        let text = Step::ReturnsDashboard.describe(&req);
        assert!(text.contains("2025-26"));
        assert!(text.contains("Quarter 2 (Jul-Sep)"));
        assert!(text.contains("August"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_just_login_reaches_logged_in() {
        let dir = tempfile::tempdir().unwrap();
        let page = scripted_portal();
        let (mut flow, events) = workflow(&page, &dir);

        flow.run(&request(ActionSet {
            just_login: true,
            ..Default::default()
        }))
        .await
        .unwrap();

        assert_eq!(flow.state(), WorkflowState::LoggedIn);
        assert_eq!(flow.visited(), &[WorkflowState::Init, WorkflowState::LoggedIn]);
        assert!(page
            .interactions()
            .contains(&"type password pw".to_string()));

        let events = events.lock().unwrap();
        let captcha = events
            .iter()
            .find(|e| e.message.contains("CAPTCHA"))
            .unwrap();
        assert_eq!(captcha.level, StatusLevel::Warning);
        assert!(events
            .iter()
            .any(|e| e.level == StatusLevel::Success && e.message.starts_with("Login successful")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_report_selects_filters_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let page = scripted_portal();
        let (mut flow, _) = workflow(&page, &dir);

        flow.run(&request(ActionSet {
            download_report: true,
            ..Default::default()
        }))
        .await
        .unwrap();

        assert_eq!(
            flow.visited(),
            &[
                WorkflowState::Init,
                WorkflowState::LoggedIn,
                WorkflowState::DashboardFiltered,
                WorkflowState::ReportDownloaded
            ]
        );
        let selects: Vec<String> = page
            .interactions()
            .into_iter()
            .filter(|i| i.starts_with("select "))
            .collect();
        assert_eq!(selects, vec!["select fin 0", "select quarter 1", "select mon 4"]);
        let clicks = page.clicks();
        let search = clicks.iter().position(|c| c == "search").unwrap();
        let generate = clicks.iter().position(|c| c == "generate_excel").unwrap();
        assert!(search < generate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_generate_button_fails_with_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new();
        let locators = PortalLocators::default();
        // Everything but the generate button.
        for (set, el) in [
            (&locators.login_link, ScriptedElement::ready("login_link")),
            (&locators.username_field, ScriptedElement::ready("username")),
            (&locators.password_field, ScriptedElement::ready("password")),
            (
                &locators.captcha_field,
                ScriptedElement::ready("captcha").navigates_to(crate::testing::WELCOME_URL),
            ),
            (&locators.returns_dashboard_button, ScriptedElement::ready("dash")),
            (&locators.financial_year_select, ScriptedElement::ready("fin").with_options(8)),
            (&locators.quarter_select, ScriptedElement::ready("quarter").with_options(4)),
            (&locators.period_select, ScriptedElement::ready("mon").with_options(12)),
            (&locators.search_button, ScriptedElement::ready("search")),
        ] {
            page.add(set.strategies[0].clone(), el);
        }
        let (mut flow, _) = workflow(&page, &dir);

        let failure = flow
            .run(&request(ActionSet {
                download_report: true,
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert_eq!(failure.step, Step::DownloadReport);
        assert_eq!(failure.error.kind(), "ElementNotFound");
        assert!(failure.screenshot.is_some());
        assert_eq!(flow.state(), WorkflowState::Failed);
        assert_eq!(
            flow.visited(),
            &[
                WorkflowState::Init,
                WorkflowState::LoggedIn,
                WorkflowState::DashboardFiltered,
                WorkflowState::Failed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_button_gets_the_file_generation_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let locators = PortalLocators::default();
        // Generate button shows up after the search, slower than the short
        // timeout allows.
        let slow = ScriptedPage::new();
        for (set, name) in [
            (&locators.login_link, "login_link"),
            (&locators.username_field, "username"),
            (&locators.password_field, "password"),
            (&locators.returns_dashboard_button, "dash"),
            (&locators.search_button, "search"),
            (&locators.offline_download_button, "offline_download"),
        ] {
            slow.add(set.strategies[0].clone(), ScriptedElement::ready(name));
        }
        slow.add(
            locators.captcha_field.strategies[0].clone(),
            ScriptedElement::ready("captcha").navigates_to(crate::testing::WELCOME_URL),
        );
        for (set, name, count) in [
            (&locators.financial_year_select, "fin", 8),
            (&locators.quarter_select, "quarter", 4),
            (&locators.period_select, "mon", 12),
        ] {
            slow.add(
                set.strategies[0].clone(),
                ScriptedElement::ready(name).with_options(count),
            );
        }

        let watcher = {
            let slow = slow.clone();
            let generate = locators.generate_excel_button.strategies[0].clone();
            tokio::spawn(async move {
                while !slow.clicks().iter().any(|c| c == "search") {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                slow.add(
                    generate,
                    ScriptedElement::ready("generate_excel")
                        .appearing_after(Duration::from_millis(300)),
                );
            })
        };

        let (mut flow, _) = workflow(&slow, &dir);
        flow.run(&request(ActionSet {
            download_report: true,
            ..Default::default()
        }))
        .await
        .unwrap();
        watcher.await.unwrap();

        assert_eq!(flow.state(), WorkflowState::ReportDownloaded);
        assert_eq!(slow.clicks().last().map(String::as_str), Some("generate_excel"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credit_ledger_types_dates_and_submits() {
        let dir = tempfile::tempdir().unwrap();
        let page = scripted_portal();
        let (mut flow, events) = workflow(&page, &dir);

        let mut req = request(ActionSet {
            access_credit_ledger: true,
            ..Default::default()
        });
        req.ledger_dates = LedgerDateRange::new("01-04-2024", "31-03-2025");
        flow.run(&req).await.unwrap();

        assert_eq!(flow.state(), WorkflowState::CreditLedgerViewed);
        let interactions = page.interactions();
        let from = interactions
            .iter()
            .position(|i| i == "type from_date 01-04-2024")
            .unwrap();
        let to = interactions
            .iter()
            .position(|i| i == "type to_date 31-03-2025")
            .unwrap();
        assert!(from < to);
        assert_eq!(page.clicks().last().map(String::as_str), Some("go"));

        let events = events.lock().unwrap();
        assert!(!events.iter().any(|e| e.level == StatusLevel::Warning
            && e.message.contains("dates")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_captcha_timeout_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new();
        let locators = PortalLocators::default();
        page.add(locators.login_link.strategies[0].clone(), ScriptedElement::ready("login_link"));
        page.add(locators.username_field.strategies[0].clone(), ScriptedElement::ready("username"));
        page.add(locators.password_field.strategies[0].clone(), ScriptedElement::ready("password"));
        page.add(locators.captcha_field.strategies[0].clone(), ScriptedElement::ready("captcha"));
        let (mut flow, _) = workflow(&page, &dir);

        let failure = flow
            .run(&request(ActionSet {
                returns_dashboard: true,
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert_eq!(failure.step, Step::Login);
        assert_eq!(failure.error.kind(), "ManualStepTimeout");
        assert_eq!(
            page.lookups(&locators.returns_dashboard_button.strategies[0]),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_date_failure_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let page = ScriptedPage::new();
        let locators = PortalLocators::default();
        for (set, name) in [
            (&locators.login_link, "login_link"),
            (&locators.username_field, "username"),
            (&locators.password_field, "password"),
            (&locators.services_menu, "services"),
            (&locators.ledgers_submenu, "ledgers"),
            (&locators.credit_ledger_link, "credit_ledger"),
            (&locators.credit_ledger_detail_link, "credit_ledger_detail"),
        ] {
            page.add(set.strategies[0].clone(), ScriptedElement::ready(name));
        }
        page.add(
            locators.captcha_field.strategies[0].clone(),
            ScriptedElement::ready("captcha").navigates_to(crate::testing::WELCOME_URL),
        );
        let (mut flow, events) = workflow(&page, &dir);

        flow.run(&request(ActionSet {
            access_credit_ledger: true,
            ..Default::default()
        }))
        .await
        .unwrap();

        assert_eq!(flow.state(), WorkflowState::CreditLedgerViewed);
        assert!(page.interactions().contains(&"hover ledgers".to_string()));
        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| e.level == StatusLevel::Warning
            && e.message.starts_with("Could not set credit ledger dates")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cash_ledger_opens_balance_details() {
        let dir = tempfile::tempdir().unwrap();
        let page = scripted_portal();
        let (mut flow, _) = workflow(&page, &dir);

        flow.run(&request(ActionSet {
            access_cash_ledger: true,
            ..Default::default()
        }))
        .await
        .unwrap();

        assert_eq!(flow.state(), WorkflowState::CashLedgerViewed);
        let clicks = page.clicks();
        assert_eq!(
            &clicks[clicks.len() - 3..],
            &["services", "cash_ledger", "cash_balance"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_browser_fails_without_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let page = scripted_portal();
        page.kill();
        let (mut flow, _) = workflow(&page, &dir);

        let failure = flow
            .run(&request(ActionSet {
                just_login: true,
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(failure.error.kind(), "SessionError");
        assert!(failure.screenshot.is_none());
        assert!(page.screenshots().is_empty());
    }
}
