//! Browser session lifecycle: launch, registry of live sessions, scoped
//! release.
//!
//! A [`SessionHandle`] exclusively owns one live browser. Dropping it
//! without calling [`SessionHandle::close`] or [`SessionHandle::retain`]
//! still terminates the browser, so failures and panics never leak one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::browser::PageDriver;
use crate::error::AutomationError;

/// How to launch a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub download_dir: PathBuf,
}

/// Starts browsers.
#[async_trait]
pub trait BrowserLauncher: Send + Sync + 'static {
    type Driver: PageDriver;

    async fn launch(&self, options: &LaunchOptions) -> Result<Self::Driver, AutomationError>;
}

/// Finds a usable browser binary.
pub trait DriverLocator: Send + Sync {
    /// Path to the browser, or [`AutomationError::DriverNotFound`].
    fn locate(&self) -> Result<PathBuf, AutomationError>;
}

/// Public description of a registered session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub headless: bool,
    pub download_dir: PathBuf,
    /// Left open after its run; closing it is the caller's job.
    pub retained: bool,
}

struct SessionEntry<D> {
    info: SessionInfo,
    driver: D,
}

type Registry<D> = Arc<RwLock<HashMap<Uuid, SessionEntry<D>>>>;

fn read<D>(registry: &Registry<D>) -> RwLockReadGuard<'_, HashMap<Uuid, SessionEntry<D>>> {
    registry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<D>(registry: &Registry<D>) -> RwLockWriteGuard<'_, HashMap<Uuid, SessionEntry<D>>> {
    registry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Opens sessions and tracks the live ones.
pub struct SessionManager<L: BrowserLauncher> {
    launcher: Arc<L>,
    registry: Registry<L::Driver>,
}

impl<L: BrowserLauncher> Clone for SessionManager<L> {
    fn clone(&self) -> Self {
        Self {
            launcher: self.launcher.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<L: BrowserLauncher> SessionManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Launch a browser and register it.
    pub async fn open(
        &self,
        options: &LaunchOptions,
    ) -> Result<SessionHandle<L::Driver>, AutomationError> {
        tokio::fs::create_dir_all(&options.download_dir)
            .await
            .map_err(|e| {
                AutomationError::Session(format!(
                    "cannot create download directory {}: {}",
                    options.download_dir.display(),
                    e
                ))
            })?;

        let driver = self.launcher.launch(options).await?;
        let info = SessionInfo {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
            headless: options.headless,
            download_dir: options.download_dir.clone(),
            retained: false,
        };

        write(&self.registry).insert(
            info.id,
            SessionEntry {
                info: info.clone(),
                driver: driver.clone(),
            },
        );
        tracing::info!("Opened browser session {}", info.id);

        Ok(SessionHandle {
            info,
            driver,
            registry: self.registry.clone(),
            released: false,
        })
    }

    /// Sessions currently registered, oldest first.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = read(&self.registry)
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        sessions.sort_by_key(|info| info.opened_at);
        sessions
    }

    /// Close a registered (typically retained) session. `false` if unknown.
    pub async fn close(&self, id: Uuid) -> bool {
        let entry = write(&self.registry).remove(&id);
        match entry {
            Some(entry) => {
                shutdown(&entry.driver, id).await;
                true
            }
            None => false,
        }
    }

    /// Close every registered session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let entries: Vec<(Uuid, L::Driver)> = write(&self.registry)
            .drain()
            .map(|(id, entry)| (id, entry.driver))
            .collect();
        for (id, driver) in &entries {
            shutdown(driver, *id).await;
        }
        entries.len()
    }
}

async fn shutdown<D: PageDriver>(driver: &D, id: Uuid) {
    match driver.shutdown().await {
        Ok(()) => tracing::info!("Closed browser session {}", id),
        // Already dead is fine.
        Err(err) => tracing::debug!("Browser session {} shutdown: {}", id, err),
    }
}

/// Exclusive owner of one live browser.
pub struct SessionHandle<D: PageDriver> {
    info: SessionInfo,
    driver: D,
    registry: Registry<D>,
    released: bool,
}

impl<D: PageDriver> SessionHandle<D> {
    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Terminate the browser and unregister. Tolerates a dead browser.
    pub async fn close(mut self) {
        self.released = true;
        write(&self.registry).remove(&self.info.id);
        shutdown(&self.driver, self.info.id).await;
    }

    /// Keep the browser running past the end of the run. It stays
    /// registered until [`SessionManager::close`].
    pub fn retain(mut self) -> SessionInfo {
        self.released = true;
        self.info.retained = true;
        if let Some(entry) = write(&self.registry).get_mut(&self.info.id) {
            entry.info.retained = true;
        }
        tracing::info!("Browser session {} retained", self.info.id);
        self.info.clone()
    }
}

impl<D: PageDriver> Drop for SessionHandle<D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        write(&self.registry).remove(&self.info.id);
        tracing::warn!("Session {} dropped without close; terminating browser", self.info.id);

        let driver = self.driver.clone();
        let id = self.info.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { shutdown(&driver, id).await });
            }
            Err(_) => tracing::error!("No runtime to terminate browser session {}", id),
        }
    }
}
