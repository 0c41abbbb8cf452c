//! Browser access: the page-driver seam, locator strategies, the resilient
//! element resolver and the action primitives built on it.

pub mod actions;
pub mod client;
pub mod locator;
pub mod resolver;

use async_trait::async_trait;
use std::path::Path;

use crate::error::DriverError;

pub use actions::Actions;
pub use client::{ChromiumDriver, ChromiumLauncher, SystemChromeLocator};
pub use locator::{LocatorMethod, LocatorStrategy, LocatorStrategySet, Query};
pub use resolver::{Resolution, ResolvedBy, Resolver};

/// Low-level operations on the single page a session drives.
///
/// Implementations are cheap handles (clone shares the same page). Every
/// method fails with [`DriverError::Disconnected`] once the browser is gone.
#[async_trait]
pub trait PageDriver: Clone + Send + Sync + 'static {
    /// Opaque reference to a DOM element.
    type Element: Clone + Send + Sync + std::fmt::Debug;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// All elements matching the strategy right now, without waiting.
    async fn find_all(&self, strategy: &LocatorStrategy)
        -> Result<Vec<Self::Element>, DriverError>;

    /// Displayed and enabled.
    async fn is_interactable(&self, element: &Self::Element) -> Result<bool, DriverError>;

    async fn is_displayed(&self, element: &Self::Element) -> Result<bool, DriverError>;

    async fn click(&self, element: &Self::Element) -> Result<(), DriverError>;

    async fn clear(&self, element: &Self::Element) -> Result<(), DriverError>;

    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<(), DriverError>;

    async fn select_index(&self, element: &Self::Element, index: usize)
        -> Result<(), DriverError>;

    async fn hover(&self, element: &Self::Element) -> Result<(), DriverError>;

    async fn execute_script(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;

    /// Terminate the browser. Tolerates an already-dead process.
    async fn shutdown(&self) -> Result<(), DriverError>;

    /// Whether the browser is still attached.
    fn is_alive(&self) -> bool;
}
