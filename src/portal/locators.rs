//! Locator tables for the GST portal.
//!
//! Each target lists its strategies most stable first. The positional
//! XPaths at the end of some sets break on the smallest layout change and
//! are only there as a last resort.

use serde::{Deserialize, Serialize};

use crate::browser::{LocatorStrategy, LocatorStrategySet};

/// Every UI target the workflow touches. Any set can be replaced from the
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalLocators {
    // Login
    pub login_link: LocatorStrategySet,
    pub loading_overlay: LocatorStrategy,
    pub username_field: LocatorStrategySet,
    pub password_field: LocatorStrategySet,
    pub captcha_field: LocatorStrategySet,
    pub post_login_popup: LocatorStrategySet,

    // Returns Dashboard
    pub returns_dashboard_button: LocatorStrategySet,
    pub financial_year_select: LocatorStrategySet,
    pub quarter_select: LocatorStrategySet,
    pub period_select: LocatorStrategySet,
    pub search_button: LocatorStrategySet,

    // GSTR-2B
    pub offline_download_button: LocatorStrategySet,
    pub generate_excel_button: LocatorStrategySet,

    // Ledgers
    pub services_menu: LocatorStrategySet,
    pub ledgers_submenu: LocatorStrategySet,
    pub credit_ledger_link: LocatorStrategySet,
    pub credit_ledger_detail_link: LocatorStrategySet,
    pub ledger_from_date: LocatorStrategySet,
    pub ledger_to_date: LocatorStrategySet,
    pub ledger_go_button: LocatorStrategySet,
    pub cash_ledger_link: LocatorStrategySet,
    pub cash_balance_details: LocatorStrategySet,
}

impl Default for PortalLocators {
    fn default() -> Self {
        use LocatorStrategy as S;

        Self {
            login_link: LocatorStrategySet::new(
                "Login link",
                vec![
                    S::xpath("//a[contains(@href,'login') and normalize-space()='Login']"),
                    S::xpath("/html/body/div[1]/header/div[2]/div/div/ul/li[2]"),
                ],
            ),
            loading_overlay: S::class("dimmer-holder"),
            username_field: LocatorStrategySet::new("Username field", vec![S::id("username")]),
            password_field: LocatorStrategySet::new("Password field", vec![S::id("user_pass")]),
            captcha_field: LocatorStrategySet::new(
                "CAPTCHA field",
                vec![
                    S::id("captcha"),
                    S::name("captcha"),
                    S::css("input[placeholder*='captcha' i]"),
                    S::css("input[type='text']:last-of-type"),
                    S::xpath("//input[@id='captcha']"),
                    S::xpath("//input[@name='captcha']"),
                    S::xpath(
                        "//input[contains(@placeholder, 'captcha') or contains(@placeholder, 'Captcha') or contains(@placeholder, 'CAPTCHA')]",
                    ),
                    S::xpath("//input[@type='text' and position()=last()]"),
                ],
            ),
            post_login_popup: LocatorStrategySet::new(
                "post-login popup close button",
                vec![S::xpath("//*[normalize-space()='Remind me later']")],
            ),

            returns_dashboard_button: LocatorStrategySet::new(
                "Returns Dashboard button",
                vec![
                    S::css("button[onclick*='return.gst.gov.in/returns/auth/dashboard']"),
                    S::xpath("//button[.//span[normalize-space()='Return Dashboard']]"),
                    S::xpath(
                        "/html/body/div[2]/div[2]/div/div[2]/div[2]/div/div[1]/div[3]/div/div[1]/button/span",
                    ),
                ],
            ),
            financial_year_select: select_set("Financial Year dropdown", "fin"),
            quarter_select: select_set("Quarter dropdown", "quarter"),
            period_select: select_set("Period dropdown", "mon"),
            search_button: LocatorStrategySet::new(
                "Search button",
                vec![
                    S::xpath("//button[normalize-space()='SEARCH']"),
                    S::css("button[type='submit']"),
                    S::xpath("//button[contains(text(), 'Search') or contains(text(), 'SEARCH')]"),
                ],
            ),

            offline_download_button: LocatorStrategySet::new(
                "GSTR-2B initial download button",
                vec![S::css("button[data-ng-click='offlinepath(x.return_ty)']")],
            ),
            generate_excel_button: LocatorStrategySet::new(
                "GSTR-2B generate Excel button",
                vec![S::xpath(
                    "//button[normalize-space()='GENERATE EXCEL FILE TO DOWNLOAD']",
                )],
            ),

            services_menu: LocatorStrategySet::new(
                "Services menu",
                vec![S::xpath(
                    "//a[contains(@class, 'dropdown-toggle') and starts-with(normalize-space(.), 'Services')]",
                )],
            ),
            ledgers_submenu: LocatorStrategySet::new("Ledgers submenu", vec![S::link_text("Ledgers")]),
            credit_ledger_link: LocatorStrategySet::new(
                "Electronic Credit Ledger link",
                vec![S::xpath(
                    "//a[@href='//return.gst.gov.in/returns/auth/ledger/itcledger' and normalize-space()='Electronic Credit Ledger']",
                )],
            ),
            credit_ledger_detail_link: LocatorStrategySet::new(
                "detailed Electronic Credit Ledger link",
                vec![S::css("a[data-ng-bind='trans.LBL_ELEC_CREDIT_LEDG']")],
            ),
            ledger_from_date: LocatorStrategySet::new("From Date field", vec![S::id("sumlg_frdt")]),
            ledger_to_date: LocatorStrategySet::new("To Date field", vec![S::id("sumlg_todt")]),
            ledger_go_button: LocatorStrategySet::new(
                "GO button",
                vec![S::css("button[data-ng-click='getdetLdgr()']")],
            ),
            cash_ledger_link: LocatorStrategySet::new(
                "Electronic Cash Ledger link",
                vec![S::xpath(
                    "//a[@href='//payment.gst.gov.in/payment/auth/ledger/cashledger' and normalize-space()='Electronic Cash Ledger']",
                )],
            ),
            cash_balance_details: LocatorStrategySet::new(
                "cash ledger balance details link",
                vec![S::css("a.inverseLink[data-target='#balanceModal']")],
            ),
        }
    }
}

/// Returns Dashboard dropdowns all share one shape keyed by `name`.
fn select_set(description: &str, name: &str) -> LocatorStrategySet {
    LocatorStrategySet::new(
        description,
        vec![
            LocatorStrategy::css(format!("select[name='{}']", name)),
            LocatorStrategy::xpath(format!(
                "//select[@name='{}' and contains(@class, 'form-control')]",
                name
            )),
            LocatorStrategy::name(name),
        ],
    )
}
