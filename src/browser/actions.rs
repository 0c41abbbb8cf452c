//! Action primitives: click, type, select, hover and bounded waits, built on
//! the resolver.
//!
//! Required targets fail with a typed [`AutomationError`]; optional ones
//! (`try_click`, `wait_for_url_contains`, `wait_for_invisible`) report a
//! plain bool.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::locator::{LocatorStrategy, LocatorStrategySet};
use super::resolver::{Condition, Resolver};
use super::PageDriver;
use crate::config::SCREENSHOT_PREFIX;
use crate::error::{AutomationError, DriverError};

enum ClickAttempt {
    Clicked,
    Exhausted { last_error: Option<String> },
}

/// Interaction primitives over one page.
#[derive(Clone)]
pub struct Actions<D: PageDriver> {
    resolver: Resolver<D>,
    poll_interval: Duration,
    /// Where debug screenshots go; `None` disables them.
    screenshot_dir: Option<PathBuf>,
}

impl<D: PageDriver> Actions<D> {
    pub fn new(driver: D, poll_interval: Duration, screenshot_dir: Option<PathBuf>) -> Self {
        Self {
            resolver: Resolver::new(driver, poll_interval),
            poll_interval,
            screenshot_dir,
        }
    }

    pub fn driver(&self) -> &D {
        self.resolver.driver()
    }

    pub fn resolver(&self) -> &Resolver<D> {
        &self.resolver
    }

    pub async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.driver().navigate(url).await.map_err(|e| {
            if e.is_disconnect() {
                e.into()
            } else {
                AutomationError::Session(format!("navigation to {} failed: {}", url, e))
            }
        })
    }

    /// Click the first clickable match of `set`.
    pub async fn click(
        &self,
        set: &LocatorStrategySet,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        match self.click_any(set, timeout).await? {
            ClickAttempt::Clicked => Ok(()),
            ClickAttempt::Exhausted { last_error } => {
                tracing::error!("Failed to click {} with any locator strategy", set.description);
                let screenshot = self.capture_screenshot(&set.description).await;
                Err(AutomationError::ElementNotFound {
                    description: set.description.clone(),
                    strategies_tried: set.len(),
                    last_error,
                    screenshot,
                })
            }
        }
    }

    /// Click an optional target. `false` when nothing could be clicked.
    /// Only a lost browser is an error.
    pub async fn try_click(
        &self,
        set: &LocatorStrategySet,
        timeout: Duration,
    ) -> Result<bool, AutomationError> {
        Ok(matches!(
            self.click_any(set, timeout).await?,
            ClickAttempt::Clicked
        ))
    }

    async fn click_any(
        &self,
        set: &LocatorStrategySet,
        timeout: Duration,
    ) -> Result<ClickAttempt, AutomationError> {
        let mut last_error = None;

        for (index, strategy) in set.iter().enumerate() {
            tracing::debug!(
                "Attempting click on {} with locator {}/{}: {}",
                set.description,
                index + 1,
                set.len(),
                strategy
            );

            let element = match self
                .resolver
                .wait_for(strategy, Condition::Interactable, timeout)
                .await
            {
                Ok(Some(element)) => element,
                Ok(None) => {
                    last_error = Some(format!(
                        "{} not clickable after {}s",
                        strategy,
                        timeout.as_secs_f64()
                    ));
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            match self.driver().click(&element).await {
                Ok(()) => {
                    tracing::info!("Clicked {} using locator {}", set.description, index + 1);
                    return Ok(ClickAttempt::Clicked);
                }
                Err(err) if err.is_disconnect() => return Err(err.into()),
                Err(err) => {
                    tracing::debug!("Click on {} via {} failed: {}", set.description, strategy, err);
                    last_error = Some(format!("{}: {}", strategy, err));
                }
            }
        }

        Ok(ClickAttempt::Exhausted { last_error })
    }

    /// Resolve, optionally clear, focus and type `text`.
    pub async fn send_keys(
        &self,
        set: &LocatorStrategySet,
        text: &str,
        clear_first: bool,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let element = self.resolve(set, timeout).await?;
        let driver = self.driver();

        if clear_first {
            driver
                .clear(&element)
                .await
                .map_err(|e| interaction("clear", set, e))?;
        }
        // Focus first; some inputs only accept keys once clicked.
        if let Err(err) = driver.click(&element).await {
            if err.is_disconnect() {
                return Err(err.into());
            }
            tracing::debug!("Focus click on {} failed: {}", set.description, err);
        }
        driver
            .type_text(&element, text)
            .await
            .map_err(|e| interaction("type into", set, e))
    }

    /// Resolve a `<select>` and pick the option at `index`.
    pub async fn select_dropdown_option(
        &self,
        set: &LocatorStrategySet,
        index: usize,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let element = self.resolve(set, timeout).await?;
        self.driver()
            .select_index(&element, index)
            .await
            .map_err(|e| interaction("select an option of", set, e))?;
        tracing::info!("Selected option {} of {}", index, set.description);
        Ok(())
    }

    /// Resolve and move the pointer onto the target.
    pub async fn hover(
        &self,
        set: &LocatorStrategySet,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let element = self.resolve(set, timeout).await?;
        self.driver()
            .hover(&element)
            .await
            .map_err(|e| interaction("hover over", set, e))
    }

    /// Poll the page URL until it contains `fragment`.
    pub async fn wait_for_url_contains(
        &self,
        fragment: &str,
        timeout: Duration,
    ) -> Result<bool, AutomationError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.driver().current_url().await {
                Ok(url) if url.contains(fragment) => {
                    tracing::info!("URL now contains '{}'", fragment);
                    return Ok(true);
                }
                Ok(_) => {}
                Err(err) if err.is_disconnect() => return Err(err.into()),
                Err(err) => tracing::debug!("Could not read URL: {}", err),
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "URL did not contain '{}' within {}s",
                    fragment,
                    timeout.as_secs()
                );
                return Ok(false);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Wait for `strategy` to match nothing visible. `false` on timeout.
    pub async fn wait_for_invisible(
        &self,
        strategy: &LocatorStrategy,
        timeout: Duration,
    ) -> Result<bool, AutomationError> {
        Ok(self.resolver.wait_until_gone(strategy, timeout).await?)
    }

    pub async fn execute_script(&self, script: &str) -> Result<serde_json::Value, AutomationError> {
        self.driver().execute_script(script).await.map_err(|e| {
            if e.is_disconnect() {
                e.into()
            } else {
                AutomationError::Interaction {
                    action: "run script on",
                    description: "page".to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }

    /// Save `debug_<suffix>_<unix-ts>.png`. Best effort: failures are logged
    /// and yield `None`.
    pub async fn capture_screenshot(&self, suffix: &str) -> Option<PathBuf> {
        let dir = self.screenshot_dir.as_ref()?;
        let path = dir.join(screenshot_file_name(suffix, chrono::Utc::now().timestamp()));

        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!("Could not create screenshot directory {}: {}", dir.display(), err);
            return None;
        }
        match self.driver().screenshot(&path).await {
            Ok(()) => {
                tracing::info!("Debug screenshot saved: {}", path.display());
                Some(path)
            }
            Err(err) => {
                tracing::warn!("Failed to save debug screenshot: {}", err);
                None
            }
        }
    }

    async fn resolve(
        &self,
        set: &LocatorStrategySet,
        timeout: Duration,
    ) -> Result<D::Element, AutomationError> {
        match self.resolver.resolve(set, timeout).await {
            Ok(resolution) => Ok(resolution.element),
            Err(AutomationError::ElementNotFound {
                description,
                strategies_tried,
                last_error,
                ..
            }) => Err(AutomationError::ElementNotFound {
                screenshot: self.capture_screenshot(&description).await,
                description,
                strategies_tried,
                last_error,
            }),
            Err(other) => Err(other),
        }
    }
}

fn interaction(action: &'static str, set: &LocatorStrategySet, err: DriverError) -> AutomationError {
    if err.is_disconnect() {
        return err.into();
    }
    AutomationError::Interaction {
        action,
        description: set.description.clone(),
        reason: err.to_string(),
    }
}

fn screenshot_file_name(suffix: &str, timestamp: i64) -> String {
    let slug: String = suffix
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}_{}.png", SCREENSHOT_PREFIX, slug, timestamp)
}
