//! Resilient element resolution across ordered fallback strategies.

use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::locator::{LocatorStrategy, LocatorStrategySet};
use super::PageDriver;
use crate::error::{AutomationError, DriverError};

/// What a wait is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// In the DOM
    Present,
    /// In the DOM, displayed and enabled
    Interactable,
}

/// Which path produced a resolved element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Immediate,
    Interactable,
    Present,
}

/// A resolved element and the strategy that found it.
#[derive(Debug, Clone)]
pub struct Resolution<E> {
    pub element: E,
    /// Zero-based position of the winning strategy
    pub strategy_index: usize,
    pub strategy: LocatorStrategy,
    pub resolved_by: ResolvedBy,
}

/// Tries each strategy of a set in order until one yields an element.
#[derive(Clone)]
pub struct Resolver<D: PageDriver> {
    driver: D,
    poll_interval: Duration,
}

impl<D: PageDriver> Resolver<D> {
    pub fn new(driver: D, poll_interval: Duration) -> Self {
        Self {
            driver,
            poll_interval,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Resolve the first usable element for `set`.
    ///
    /// Per strategy: immediate lookup, then up to `timeout` waiting for an
    /// interactable match, then up to `timeout` waiting for mere presence.
    /// A disconnect aborts the whole resolution with a session error.
    pub async fn resolve(
        &self,
        set: &LocatorStrategySet,
        timeout: Duration,
    ) -> Result<Resolution<D::Element>, AutomationError> {
        let description = &set.description;
        let total = set.len();
        let mut last_error = None;

        if let Ok(url) = self.driver.current_url().await {
            tracing::debug!("Searching for {} on page: {}", description, url);
        }

        for (index, strategy) in set.iter().enumerate() {
            tracing::info!(
                "Trying locator {}/{} for {}: {}",
                index + 1,
                total,
                description,
                strategy
            );

            let attempt = self.resolve_one(strategy, timeout).await;
            match attempt {
                Ok(Some((element, resolved_by))) => {
                    tracing::info!(
                        "Found {} with locator {} ({:?})",
                        description,
                        index + 1,
                        resolved_by
                    );
                    return Ok(Resolution {
                        element,
                        strategy_index: index,
                        strategy: strategy.clone(),
                        resolved_by,
                    });
                }
                Ok(None) => {
                    tracing::debug!("Locator {} failed for {}: timed out", index + 1, description);
                    last_error = Some(format!(
                        "{} timed out after {}s",
                        strategy,
                        timeout.as_secs_f64()
                    ));
                }
                Err(err) if err.is_disconnect() => return Err(err.into()),
                Err(err) => {
                    tracing::debug!("Locator {} errored for {}: {}", index + 1, description, err);
                    last_error = Some(format!("{}: {}", strategy, err));
                }
            }
        }

        tracing::error!(
            "Could not find {} with any of the {} locator strategies",
            description,
            total
        );
        Err(AutomationError::ElementNotFound {
            description: description.clone(),
            strategies_tried: total,
            last_error,
            screenshot: None,
        })
    }

    async fn resolve_one(
        &self,
        strategy: &LocatorStrategy,
        timeout: Duration,
    ) -> Result<Option<(D::Element, ResolvedBy)>, DriverError> {
        if let Some(element) = self.first_match(strategy).await? {
            return Ok(Some((element, ResolvedBy::Immediate)));
        }
        if let Some(element) = self
            .wait_for(strategy, Condition::Interactable, timeout)
            .await?
        {
            return Ok(Some((element, ResolvedBy::Interactable)));
        }
        Ok(self
            .wait_for(strategy, Condition::Present, timeout)
            .await?
            .map(|element| (element, ResolvedBy::Present)))
    }

    /// Immediate lookup. Query errors other than a disconnect count as no
    /// match.
    pub async fn first_match(
        &self,
        strategy: &LocatorStrategy,
    ) -> Result<Option<D::Element>, DriverError> {
        self.probe(strategy, Condition::Present).await
    }

    /// Poll until an element satisfying `condition` appears or `timeout`
    /// elapses. `Ok(None)` on timeout.
    pub async fn wait_for(
        &self,
        strategy: &LocatorStrategy,
        condition: Condition,
        timeout: Duration,
    ) -> Result<Option<D::Element>, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.probe(strategy, condition).await? {
                return Ok(Some(element));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Poll until no displayed element matches `strategy`. `Ok(false)` on
    /// timeout.
    pub async fn wait_until_gone(
        &self,
        strategy: &LocatorStrategy,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.any_displayed(strategy).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn any_displayed(&self, strategy: &LocatorStrategy) -> Result<bool, DriverError> {
        for element in self.lookup(strategy).await? {
            match self.driver.is_displayed(&element).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) if err.is_disconnect() => return Err(err),
                Err(_) => {}
            }
        }
        Ok(false)
    }

    async fn probe(
        &self,
        strategy: &LocatorStrategy,
        condition: Condition,
    ) -> Result<Option<D::Element>, DriverError> {
        let elements = self.lookup(strategy).await?;
        if condition == Condition::Present {
            return Ok(elements.into_iter().next());
        }
        for element in elements {
            match self.driver.is_interactable(&element).await {
                Ok(true) => return Ok(Some(element)),
                Ok(false) => {}
                Err(err) if err.is_disconnect() => return Err(err),
                // Went stale between lookup and check
                Err(_) => {}
            }
        }
        Ok(None)
    }

    async fn lookup(&self, strategy: &LocatorStrategy) -> Result<Vec<D::Element>, DriverError> {
        match self.driver.find_all(strategy).await {
            Ok(elements) => Ok(elements),
            Err(err) if err.is_disconnect() => Err(err),
            Err(err) => {
                tracing::debug!("Lookup failed for {}: {}", strategy, err);
                Ok(Vec::new())
            }
        }
    }
}
