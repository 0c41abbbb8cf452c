//! Runtime configuration: portal endpoints, timeouts, settle delays, locator
//! tables and browser options.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to override.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::portal::PortalLocators;

/// Name of the folder downloads and debug screenshots are written to.
pub const DOWNLOAD_FOLDER_NAME: &str = "GST_Downloads";

/// Prefix for debug screenshot file names.
pub const SCREENSHOT_PREFIX: &str = "debug_";

/// Serde helper: durations as (fractional) seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Portal URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalEndpoints {
    pub base_url: String,
    /// Fragment the URL contains once login (and CAPTCHA) succeeded.
    pub welcome_url_fragment: String,
}

impl Default for PortalEndpoints {
    fn default() -> Self {
        Self {
            base_url: "https://www.gst.gov.in/".to_string(),
            welcome_url_fragment: "services.gst.gov.in/services/auth/fowelcome".to_string(),
        }
    }
}

/// The bounded wait palette. No wait in the workflow is unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Quick elements (forms, buttons)
    #[serde(with = "secs")]
    pub short: Duration,
    /// Slower loading elements (dashboards, menus)
    #[serde(with = "secs")]
    pub long: Duration,
    /// Heavy pages and file generation
    #[serde(with = "secs")]
    pub very_long: Duration,
    /// Time the operator has to solve the CAPTCHA
    #[serde(with = "secs")]
    pub manual_captcha: Duration,
    /// Poll interval for every condition wait
    #[serde(with = "secs")]
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(15),
            long: Duration::from_secs(40),
            very_long: Duration::from_secs(75),
            manual_captcha: Duration::from_secs(90),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Fixed, unconditional pauses that give the portal's client-side code time
/// to settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    #[serde(with = "secs")]
    pub post_login: Duration,
    #[serde(with = "secs")]
    pub popup_dismissed: Duration,
    #[serde(with = "secs")]
    pub dashboard_load: Duration,
    /// Dropdowns exist before the page framework makes them interactive.
    #[serde(with = "secs")]
    pub dropdown_init: Duration,
    #[serde(with = "secs")]
    pub between_selects: Duration,
    #[serde(with = "secs")]
    pub after_search: Duration,
    #[serde(with = "secs")]
    pub after_export_trigger: Duration,
    /// Time the browser gets to finish a download. Completion is not verified.
    #[serde(with = "secs")]
    pub download: Duration,
    #[serde(with = "secs")]
    pub menu_open: Duration,
    #[serde(with = "secs")]
    pub ledger_page: Duration,
    #[serde(with = "secs")]
    pub date_picker: Duration,
    #[serde(with = "secs")]
    pub balance_modal: Duration,
    /// Wait for the operator to enter ledger dates by hand when the date
    /// widgets cannot be driven. Zero returns control immediately.
    #[serde(with = "secs")]
    pub manual_date_entry: Duration,
    #[serde(with = "secs")]
    pub before_close: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            post_login: Duration::from_secs(2),
            popup_dismissed: Duration::from_secs(1),
            dashboard_load: Duration::from_secs(3),
            dropdown_init: Duration::from_secs(5),
            between_selects: Duration::from_millis(500),
            after_search: Duration::from_secs(2),
            after_export_trigger: Duration::from_secs(3),
            download: Duration::from_secs(15),
            menu_open: Duration::from_secs(1),
            ledger_page: Duration::from_secs(2),
            date_picker: Duration::from_millis(500),
            balance_modal: Duration::from_secs(3),
            manual_date_entry: Duration::from_secs(15),
            before_close: Duration::from_secs(5),
        }
    }
}

/// Sleep for a settle delay. Zero delays return without yielding to the
/// timer.
pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl SettleDelays {
    /// All delays zero.
    pub fn none() -> Self {
        Self {
            post_login: Duration::ZERO,
            popup_dismissed: Duration::ZERO,
            dashboard_load: Duration::ZERO,
            dropdown_init: Duration::ZERO,
            between_selects: Duration::ZERO,
            after_search: Duration::ZERO,
            after_export_trigger: Duration::ZERO,
            download: Duration::ZERO,
            menu_open: Duration::ZERO,
            ledger_page: Duration::ZERO,
            date_picker: Duration::ZERO,
            balance_modal: Duration::ZERO,
            manual_date_entry: Duration::ZERO,
            before_close: Duration::ZERO,
        }
    }
}

/// Full automation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub portal: PortalEndpoints,
    pub timeouts: Timeouts,
    pub settle: SettleDelays,
    pub locators: PortalLocators,
    /// Run Chrome without a window
    pub headless: bool,
    /// Where downloads and debug screenshots land
    pub download_dir: PathBuf,
    /// Explicit browser binary; otherwise discovered
    #[serde(default)]
    pub browser_path: Option<PathBuf>,
    pub screenshots_on_error: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            portal: PortalEndpoints::default(),
            timeouts: Timeouts::default(),
            settle: SettleDelays::default(),
            locators: PortalLocators::default(),
            headless: false,
            download_dir: default_download_dir(),
            browser_path: None,
            screenshots_on_error: true,
        }
    }
}

impl AutomationConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let path = expand_path(path);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        config.download_dir = expand_path(&config.download_dir.to_string_lossy());
        config.browser_path = config
            .browser_path
            .map(|p| expand_path(&p.to_string_lossy()));

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Create the download directory if needed.
    pub fn ensure_download_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!(
                "Failed to create download directory {}",
                self.download_dir.display()
            )
        })?;
        Ok(&self.download_dir)
    }
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(path).map(|p| p.into_owned()).unwrap_or_else(|_| {
        shellexpand::tilde(path).into_owned()
    }))
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DOWNLOAD_FOLDER_NAME)
}
