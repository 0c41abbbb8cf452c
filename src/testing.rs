//! Scripted in-memory page driver and launcher for unit tests.
//!
//! Elements are registered per locator strategy with timing relative to the
//! (paused) tokio clock, so waits and timeouts run in virtual time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::browser::{LocatorStrategy, LocatorStrategySet, PageDriver};
use crate::config::{AutomationConfig, SettleDelays, Timeouts};
use crate::error::{AutomationError, DriverError};
use crate::portal::PortalLocators;
use crate::session::{BrowserLauncher, LaunchOptions};

/// One fake DOM element.
#[derive(Debug, Clone)]
pub struct ScriptedElement {
    name: String,
    appears_after: Duration,
    hidden_after: Option<Duration>,
    interactable: bool,
    click_fails: bool,
    options: Option<usize>,
    navigates_to: Option<String>,
}

impl ScriptedElement {
    /// Present and interactable from the start.
    pub fn ready(name: &str) -> Self {
        Self {
            name: name.to_string(),
            appears_after: Duration::ZERO,
            hidden_after: None,
            interactable: true,
            click_fails: false,
            options: None,
            navigates_to: None,
        }
    }

    pub fn appearing_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn hidden_after(mut self, delay: Duration) -> Self {
        self.hidden_after = Some(delay);
        self
    }

    pub fn never_interactable(mut self) -> Self {
        self.interactable = false;
        self
    }

    pub fn failing_clicks(mut self) -> Self {
        self.click_fails = true;
        self
    }

    /// Clicking it changes the page URL.
    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }

    /// Make it a `<select>` with `count` options.
    pub fn with_options(mut self, count: usize) -> Self {
        self.options = Some(count);
        self
    }
}

struct Placed {
    element: ScriptedElement,
    appears_at: Instant,
    hidden_at: Option<Instant>,
}

#[derive(Default)]
struct PageState {
    elements: Vec<(String, Placed)>,
    lookups: HashMap<String, usize>,
    urls: Vec<(Instant, String)>,
    interactions: Vec<String>,
    screenshots: Vec<PathBuf>,
    dead: bool,
    shutdowns: usize,
}

/// Fake page. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    state: Arc<Mutex<PageState>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, strategy: LocatorStrategy, element: ScriptedElement) {
        let now = Instant::now();
        let placed = Placed {
            appears_at: now + element.appears_after,
            hidden_at: element.hidden_after.map(|d| now + d),
            element,
        };
        self.state
            .lock()
            .unwrap()
            .elements
            .push((strategy.to_string(), placed));
    }

    /// The page URL becomes `url` after `delay`.
    pub fn url_after(&self, delay: Duration, url: &str) {
        let at = Instant::now() + delay;
        self.state.lock().unwrap().urls.push((at, url.to_string()));
    }

    /// Simulate the browser dying.
    pub fn kill(&self) {
        self.state.lock().unwrap().dead = true;
    }

    pub fn lookups(&self, strategy: &LocatorStrategy) -> usize {
        let state = self.state.lock().unwrap();
        state
            .lookups
            .get(&strategy.to_string())
            .copied()
            .unwrap_or(0)
    }

    pub fn interactions(&self) -> Vec<String> {
        self.state.lock().unwrap().interactions.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.interactions()
            .into_iter()
            .filter_map(|i| i.strip_prefix("click ").map(str::to_string))
            .collect()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.state.lock().unwrap().shutdowns
    }

    fn with_alive<T>(&self, f: impl FnOnce(&mut PageState) -> Result<T, DriverError>) -> Result<T, DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.dead {
            return Err(DriverError::Disconnected("browser closed".to_string()));
        }
        f(&mut state)
    }

    fn with_element<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut PageState, &ScriptedElement, bool) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        self.with_alive(|state| {
            let now = Instant::now();
            let found = state
                .elements
                .iter()
                .find(|(_, p)| p.element.name == name && now >= p.appears_at)
                .map(|(_, p)| {
                    let displayed = p.hidden_at.map_or(true, |h| now < h);
                    (p.element.clone(), displayed)
                });
            match found {
                Some((element, displayed)) => f(state, &element, displayed),
                None => Err(DriverError::Stale(name.to_string())),
            }
        })
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    type Element = String;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.with_alive(|state| {
            state.interactions.push(format!("navigate {}", url));
            state.urls.push((Instant::now(), url.to_string()));
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.with_alive(|state| {
            let now = Instant::now();
            Ok(state
                .urls
                .iter()
                .filter(|(at, _)| *at <= now)
                .max_by_key(|(at, _)| *at)
                .map(|(_, url)| url.clone())
                .unwrap_or_else(|| "about:blank".to_string()))
        })
    }

    async fn find_all(&self, strategy: &LocatorStrategy) -> Result<Vec<String>, DriverError> {
        self.with_alive(|state| {
            let key = strategy.to_string();
            *state.lookups.entry(key.clone()).or_default() += 1;
            let now = Instant::now();
            Ok(state
                .elements
                .iter()
                .filter(|(k, p)| *k == key && now >= p.appears_at)
                .map(|(_, p)| p.element.name.clone())
                .collect())
        })
    }

    async fn is_interactable(&self, element: &String) -> Result<bool, DriverError> {
        self.with_element(element, |_, el, displayed| Ok(el.interactable && displayed))
    }

    async fn is_displayed(&self, element: &String) -> Result<bool, DriverError> {
        self.with_element(element, |_, _, displayed| Ok(displayed))
    }

    async fn click(&self, element: &String) -> Result<(), DriverError> {
        self.with_element(element, |state, el, _| {
            if el.click_fails {
                return Err(DriverError::Protocol("element click intercepted".to_string()));
            }
            state.interactions.push(format!("click {}", el.name));
            if let Some(url) = &el.navigates_to {
                state.urls.push((Instant::now(), url.clone()));
            }
            Ok(())
        })
    }

    async fn clear(&self, element: &String) -> Result<(), DriverError> {
        self.with_element(element, |state, el, _| {
            state.interactions.push(format!("clear {}", el.name));
            Ok(())
        })
    }

    async fn type_text(&self, element: &String, text: &str) -> Result<(), DriverError> {
        self.with_element(element, |state, el, _| {
            state.interactions.push(format!("type {} {}", el.name, text));
            Ok(())
        })
    }

    async fn select_index(&self, element: &String, index: usize) -> Result<(), DriverError> {
        self.with_element(element, |state, el, _| match el.options {
            None => Err(DriverError::NotSelectable),
            Some(len) if index >= len => Err(DriverError::IndexOutOfRange { index, len }),
            Some(_) => {
                state.interactions.push(format!("select {} {}", el.name, index));
                Ok(())
            }
        })
    }

    async fn hover(&self, element: &String) -> Result<(), DriverError> {
        self.with_element(element, |state, el, _| {
            state.interactions.push(format!("hover {}", el.name));
            Ok(())
        })
    }

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        self.with_alive(|state| {
            state.interactions.push(format!("script {}", script));
            Ok(serde_json::Value::Null)
        })
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.with_alive(|state| {
            state.screenshots.push(path.to_path_buf());
            Ok(())
        })
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.dead = true;
        state.shutdowns += 1;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.state.lock().unwrap().dead
    }
}

/// Hands out one shared scripted page, or fails every launch.
#[derive(Clone)]
pub struct ScriptedLauncher {
    page: ScriptedPage,
    fail_with: Option<String>,
    launches: Arc<Mutex<Vec<LaunchOptions>>>,
}

impl ScriptedLauncher {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            fail_with: None,
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::new(ScriptedPage::new())
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn last_launch(&self) -> Option<LaunchOptions> {
        self.launches.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    type Driver = ScriptedPage;

    async fn launch(&self, options: &LaunchOptions) -> Result<ScriptedPage, AutomationError> {
        self.launches.lock().unwrap().push(options.clone());
        match &self.fail_with {
            Some(reason) => Err(AutomationError::DriverNotFound(reason.clone())),
            None => Ok(self.page.clone()),
        }
    }
}

/// Welcome page the scripted CAPTCHA field "logs in" to.
pub const WELCOME_URL: &str = "https://services.gst.gov.in/services/auth/fowelcome";

/// A page with every default portal target present on its first strategy.
/// Clicking the CAPTCHA field lands on the welcome page.
pub fn scripted_portal() -> ScriptedPage {
    let locators = PortalLocators::default();
    let page = ScriptedPage::new();
    let first = |set: &LocatorStrategySet| set.strategies[0].clone();

    page.add(first(&locators.login_link), ScriptedElement::ready("login_link"));
    page.add(first(&locators.username_field), ScriptedElement::ready("username"));
    page.add(first(&locators.password_field), ScriptedElement::ready("password"));
    page.add(
        first(&locators.captcha_field),
        ScriptedElement::ready("captcha").navigates_to(WELCOME_URL),
    );
    page.add(
        first(&locators.returns_dashboard_button),
        ScriptedElement::ready("returns_dashboard"),
    );
    page.add(
        first(&locators.financial_year_select),
        ScriptedElement::ready("fin").with_options(8),
    );
    page.add(
        first(&locators.quarter_select),
        ScriptedElement::ready("quarter").with_options(4),
    );
    page.add(
        first(&locators.period_select),
        ScriptedElement::ready("mon").with_options(12),
    );
    page.add(first(&locators.search_button), ScriptedElement::ready("search"));
    page.add(
        first(&locators.offline_download_button),
        ScriptedElement::ready("offline_download"),
    );
    page.add(
        first(&locators.generate_excel_button),
        ScriptedElement::ready("generate_excel"),
    );
    page.add(first(&locators.services_menu), ScriptedElement::ready("services"));
    page.add(first(&locators.ledgers_submenu), ScriptedElement::ready("ledgers"));
    page.add(
        first(&locators.credit_ledger_link),
        ScriptedElement::ready("credit_ledger"),
    );
    page.add(
        first(&locators.credit_ledger_detail_link),
        ScriptedElement::ready("credit_ledger_detail"),
    );
    page.add(first(&locators.ledger_from_date), ScriptedElement::ready("from_date"));
    page.add(first(&locators.ledger_to_date), ScriptedElement::ready("to_date"));
    page.add(first(&locators.ledger_go_button), ScriptedElement::ready("go"));
    page.add(first(&locators.cash_ledger_link), ScriptedElement::ready("cash_ledger"));
    page.add(
        first(&locators.cash_balance_details),
        ScriptedElement::ready("cash_balance"),
    );
    page
}

/// Short timeouts and no settle pauses, downloads under `dir`.
pub fn fast_config(dir: &Path) -> AutomationConfig {
    AutomationConfig {
        timeouts: Timeouts {
            short: Duration::from_millis(200),
            long: Duration::from_millis(300),
            very_long: Duration::from_millis(400),
            manual_captcha: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
        },
        settle: SettleDelays::none(),
        headless: true,
        download_dir: dir.to_path_buf(),
        ..AutomationConfig::default()
    }
}
