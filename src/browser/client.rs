//! Chrome CDP page driver, launcher and browser discovery.
//!
//! Elements are addressed by a `data-gst-ref` attribute stamped onto every
//! node a lookup returns, so a handle survives across CDP calls as a plain
//! CSS selector.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::locator::{LocatorStrategy, Query};
use super::PageDriver;
use crate::error::{AutomationError, DriverError};
use crate::session::{BrowserLauncher, DriverLocator, LaunchOptions};

const REF_ATTRIBUTE: &str = "data-gst-ref";

/// Environment variable naming an explicit browser binary.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Drives the single page of one launched Chrome.
#[derive(Clone)]
pub struct ChromiumDriver {
    page: Page,
    browser: Arc<Mutex<Option<Browser>>>,
    alive: Arc<AtomicBool>,
    profile_dir: PathBuf,
}

impl ChromiumDriver {
    fn check_alive(&self) -> Result<(), DriverError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::Disconnected("browser has been closed".to_string()))
        }
    }

    fn cdp(&self, err: CdpError) -> DriverError {
        let err = DriverError::from(err);
        if err.is_disconnect() {
            self.alive.store(false, Ordering::SeqCst);
        }
        err
    }

    async fn evaluate(&self, script: String) -> Result<Value, DriverError> {
        self.check_alive()?;
        let result = self.page.evaluate(script).await.map_err(|e| self.cdp(e))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn element(&self, element: &str) -> Result<chromiumoxide::element::Element, DriverError> {
        self.check_alive()?;
        self.page
            .find_element(ref_selector(element))
            .await
            .map_err(|e| match self.cdp(e) {
                DriverError::Protocol(reason) => DriverError::Stale(reason),
                other => other,
            })
    }

    /// Evaluate `body` with `el` bound to the referenced element. A `null`
    /// result means the element is gone.
    async fn with_element_js(&self, element: &str, body: &str) -> Result<Value, DriverError> {
        let selector = json_string(&ref_selector(element))?;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return null;
                {body}
            }})()"#
        );
        match self.evaluate(script).await? {
            Value::Null => Err(DriverError::Stale(element.to_string())),
            value => Ok(value),
        }
    }

    async fn visibility(&self, element: &str) -> Result<(bool, bool), DriverError> {
        let value = self
            .with_element_js(
                element,
                r#"const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                const visible = style.display !== 'none'
                    && style.visibility !== 'hidden'
                    && parseFloat(style.opacity || '1') > 0
                    && (rect.width > 0 || rect.height > 0);
                return { visible, enabled: !el.disabled };"#,
            )
            .await?;
        let visible = value["visible"].as_bool().unwrap_or(false);
        let enabled = value["enabled"].as_bool().unwrap_or(false);
        Ok((visible, enabled))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    type Element = String;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.check_alive()?;
        self.page.goto(url).await.map_err(|e| self.cdp(e))?;
        self.page.wait_for_navigation().await.ok();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.check_alive()?;
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| self.cdp(e))?
            .unwrap_or_default())
    }

    async fn find_all(&self, strategy: &LocatorStrategy) -> Result<Vec<String>, DriverError> {
        let (kind, selector) = match strategy.to_query() {
            Query::Css(selector) => ("css", selector),
            Query::XPath(selector) => ("xpath", selector),
        };
        let script = format!(
            r#"(() => {{
                const kind = {kind};
                const sel = {sel};
                let nodes = [];
                if (kind === 'css') {{
                    nodes = Array.from(document.querySelectorAll(sel));
                }} else {{
                    const snap = document.evaluate(sel, document, null,
                        XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                    for (let i = 0; i < snap.snapshotLength; i++) nodes.push(snap.snapshotItem(i));
                }}
                window.__gstRefSeq = window.__gstRefSeq || 0;
                return nodes
                    .filter(n => n.nodeType === Node.ELEMENT_NODE)
                    .map(n => {{
                        if (!n.hasAttribute({attr})) n.setAttribute({attr}, String(++window.__gstRefSeq));
                        return n.getAttribute({attr});
                    }});
            }})()"#,
            kind = json_string(kind)?,
            sel = json_string(&selector)?,
            attr = json_string(REF_ATTRIBUTE)?,
        );

        let value = self.evaluate(script).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Protocol(e.to_string()))
    }

    async fn is_interactable(&self, element: &String) -> Result<bool, DriverError> {
        let (visible, enabled) = self.visibility(element).await?;
        Ok(visible && enabled)
    }

    async fn is_displayed(&self, element: &String) -> Result<bool, DriverError> {
        Ok(self.visibility(element).await?.0)
    }

    async fn click(&self, element: &String) -> Result<(), DriverError> {
        let el = self.element(element).await?;
        el.click().await.map_err(|e| self.cdp(e))?;
        Ok(())
    }

    async fn clear(&self, element: &String) -> Result<(), DriverError> {
        self.with_element_js(
            element,
            r#"if ('value' in el) {
                    el.value = '';
                    el.dispatchEvent(new Event('input', { bubbles: true }));
                }
                return true;"#,
        )
        .await?;
        Ok(())
    }

    async fn type_text(&self, element: &String, text: &str) -> Result<(), DriverError> {
        let el = self.element(element).await?;
        el.type_str(text).await.map_err(|e| self.cdp(e))?;
        Ok(())
    }

    async fn select_index(&self, element: &String, index: usize) -> Result<(), DriverError> {
        let body = format!(
            r#"if (el.tagName !== 'SELECT') return 'not-select';
                if ({index} >= el.options.length) return 'out-of-range:' + el.options.length;
                el.selectedIndex = {index};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return 'ok';"#
        );
        let status = self.with_element_js(element, &body).await?;
        match status.as_str().unwrap_or_default() {
            "ok" => Ok(()),
            "not-select" => Err(DriverError::NotSelectable),
            other => match other.strip_prefix("out-of-range:") {
                Some(len) => Err(DriverError::IndexOutOfRange {
                    index,
                    len: len.parse().unwrap_or(0),
                }),
                None => Err(DriverError::Protocol(format!("unexpected select result: {}", other))),
            },
        }
    }

    async fn hover(&self, element: &String) -> Result<(), DriverError> {
        let el = self.element(element).await?;
        el.hover().await.map_err(|e| self.cdp(e))?;
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<Value, DriverError> {
        self.evaluate(script.to_string()).await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.check_alive()?;
        let data = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| self.cdp(e))?;
        tokio::fs::write(path, &data)
            .await
            .map_err(|e| DriverError::Protocol(format!("write {}: {}", path.display(), e)))
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        self.alive.store(false, Ordering::SeqCst);
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        if let Err(err) = browser.close().await {
            tracing::debug!("Browser close failed: {}", err);
        }
        if let Some(Err(err)) = browser.kill().await {
            tracing::debug!("Browser kill failed: {}", err);
        }
        if let Err(err) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            tracing::debug!("Could not remove profile {}: {}", self.profile_dir.display(), err);
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

fn ref_selector(element: &str) -> String {
    format!("[{}='{}']", REF_ATTRIBUTE, element)
}

fn json_string(value: &str) -> Result<String, DriverError> {
    serde_json::to_string(value).map_err(|e| DriverError::Protocol(e.to_string()))
}

/// Launches Chrome with a fresh profile configured for silent downloads.
pub struct ChromiumLauncher {
    locator: Arc<dyn DriverLocator>,
}

impl ChromiumLauncher {
    pub fn new(locator: Arc<dyn DriverLocator>) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Driver = ChromiumDriver;

    async fn launch(&self, options: &LaunchOptions) -> Result<ChromiumDriver, AutomationError> {
        let chrome_path = self.locator.locate()?;
        let profile_dir = std::env::temp_dir().join(format!("gst-automation-{}", uuid::Uuid::new_v4()));

        let (browser, page) = start_browser(&chrome_path, &profile_dir, options)
            .await
            .map_err(|e| AutomationError::Session(format!("{:#}", e)))?;

        Ok(ChromiumDriver {
            page,
            browser: Arc::new(Mutex::new(Some(browser))),
            alive: Arc::new(AtomicBool::new(true)),
            profile_dir,
        })
    }
}

async fn start_browser(
    chrome_path: &Path,
    profile_dir: &Path,
    options: &LaunchOptions,
) -> Result<(Browser, Page)> {
    write_profile_preferences(profile_dir, &options.download_dir).await?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .user_data_dir(profile_dir)
        .viewport(None)
        .no_sandbox()
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--no-first-run")
        .arg("--disable-default-apps")
        .arg("--password-store=basic");

    if !options.headless {
        builder = builder.with_head().arg("--start-maximized");
    }

    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

    tracing::info!("Launching browser: {}", chrome_path.display());
    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("Failed to launch browser")?;

    // Drain CDP events
    tokio::spawn(async move { while handler.next().await.is_some() {} });

    let page = browser
        .new_page("about:blank")
        .await
        .context("Failed to create initial page")?;

    let mut download = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
    download.download_path = Some(options.download_dir.to_string_lossy().into_owned());
    if let Err(err) = browser.execute(download).await {
        tracing::warn!("Could not set download behavior: {}", err);
    }

    Ok((browser, page))
}

/// Seed the profile so downloads land in `download_dir` without prompting
/// and PDFs are saved rather than previewed.
async fn write_profile_preferences(profile_dir: &Path, download_dir: &Path) -> Result<()> {
    let default_dir = profile_dir.join("Default");
    tokio::fs::create_dir_all(&default_dir)
        .await
        .with_context(|| format!("Failed to create profile {}", default_dir.display()))?;

    let preferences = download_preferences(download_dir);
    tokio::fs::write(
        default_dir.join("Preferences"),
        serde_json::to_vec_pretty(&preferences)?,
    )
    .await
    .context("Failed to write browser preferences")?;
    Ok(())
}

fn download_preferences(download_dir: &Path) -> Value {
    serde_json::json!({
        "download": {
            "default_directory": download_dir.to_string_lossy(),
            "prompt_for_download": false,
            "directory_upgrade": true
        },
        "plugins": {
            "always_open_pdf_externally": true
        }
    })
}

/// Finds Chrome: explicit path, `CHROME_PATH`, a Playwright Chromium, then
/// well-known install locations.
#[derive(Debug, Clone, Default)]
pub struct SystemChromeLocator {
    explicit: Option<PathBuf>,
}

impl SystemChromeLocator {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    fn find(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return path.exists().then(|| path.clone());
        }

        if let Some(path) = std::env::var_os(CHROME_PATH_ENV).map(PathBuf::from) {
            if path.exists() {
                tracing::info!("Using Chrome from {}: {}", CHROME_PATH_ENV, path.display());
                return Some(path);
            }
            tracing::warn!("{} points to missing file {}", CHROME_PATH_ENV, path.display());
        }

        if let Some(path) = playwright_chromium() {
            tracing::info!("Using Playwright Chromium at: {:?}", path);
            return Some(path);
        }

        let paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        paths.iter().map(PathBuf::from).find(|p| {
            let found = p.exists();
            if found {
                tracing::info!("Found Chrome at: {}", p.display());
            }
            found
        })
    }
}

impl DriverLocator for SystemChromeLocator {
    fn locate(&self) -> Result<PathBuf, AutomationError> {
        self.find().ok_or_else(|| {
            let reason = match &self.explicit {
                Some(path) => format!("browser binary {} does not exist", path.display()),
                None => format!(
                    "Chrome/Chromium not found. Install Google Chrome or set {}",
                    CHROME_PATH_ENV
                ),
            };
            AutomationError::DriverNotFound(reason)
        })
    }
}

fn playwright_chromium() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let binaries: &[&str] = if cfg!(target_os = "macos") {
        &["chrome-mac/Chromium.app/Contents/MacOS/Chromium"]
    } else {
        &["chrome-linux/chrome", "chrome-linux64/chrome"]
    };

    for cache in [
        home.join("Library/Caches/ms-playwright"),
        home.join(".cache/ms-playwright"),
    ] {
        let Ok(entries) = std::fs::read_dir(&cache) else {
            continue;
        };
        let mut dirs: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("chromium-"))
            .collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.file_name()));

        for dir in dirs {
            for binary in binaries {
                let path = dir.path().join(binary);
                if path.exists() {
                    return Some(path);
                }
            }
        }
    }
    None
}

/// Run `<browser> --version` and return its output.
pub fn browser_version(path: &Path) -> Result<String> {
    let output = std::process::Command::new(path)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to run {}", path.display()))?;
    if !output.status.success() {
        anyhow::bail!(
            "{} --version exited with {}",
            path.display(),
            output.status
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
