//! AutomationService: validates requests, runs each on its own worker
//! thread and owns the tokio runtime sessions live on.
//!
//! The runtime outlives individual runs so a browser kept open with
//! `keep_open` stays usable until the caller closes it.

use anyhow::{Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::runtime::{Handle, Runtime};
use tracing::Instrument;
use uuid::Uuid;

use crate::browser::{ChromiumLauncher, PageDriver, SystemChromeLocator};
use crate::config::{pause, AutomationConfig};
use crate::error::AutomationError;
use crate::models::{AutomationRequest, RunFailure, RunOutcome};
use crate::portal::{Workflow, WorkflowFailure, WorkflowState};
use crate::session::{BrowserLauncher, LaunchOptions, SessionInfo, SessionManager};
use crate::status::{StatusReporter, StatusSink};

/// Runs automation requests against the GST portal.
pub struct AutomationService<L: BrowserLauncher = ChromiumLauncher> {
    runtime: Arc<Runtime>,
    sessions: SessionManager<L>,
    config: Arc<AutomationConfig>,
}

impl AutomationService<ChromiumLauncher> {
    /// Service using the system Chrome.
    pub fn new(config: AutomationConfig) -> Result<Self> {
        let locator = SystemChromeLocator::new(config.browser_path.clone());
        Self::with_launcher(config, ChromiumLauncher::new(Arc::new(locator)))
    }
}

impl<L: BrowserLauncher> AutomationService<L> {
    pub fn with_launcher(config: AutomationConfig, launcher: L) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("gst-automation")
            .build()
            .context("Failed to create tokio runtime")?;

        Ok(Self {
            runtime: Arc::new(runtime),
            sessions: SessionManager::new(launcher),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Validate `request` and start it on a worker thread.
    ///
    /// Fails with [`AutomationError::Configuration`] before any browser is
    /// launched if the request is invalid. Status events reach `sink` on the
    /// worker thread, in order; the final summary is always the last one.
    pub fn start(
        &self,
        request: AutomationRequest,
        sink: Arc<dyn StatusSink>,
    ) -> Result<RunHandle<L::Driver>, AutomationError> {
        let request = request.prepare()?;
        let run_id = Uuid::new_v4();
        let cancel = Arc::new(CancelSlot::default());
        let reporter = StatusReporter::new(sink);

        let run = execute(
            run_id,
            self.sessions.clone(),
            self.config.clone(),
            request,
            reporter.clone(),
            cancel.clone(),
        )
        .instrument(tracing::info_span!("run", id = %run_id));

        let handle = self.runtime.handle().clone();
        let worker = move || match panic::catch_unwind(AssertUnwindSafe(|| handle.block_on(run))) {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!("Worker for run {} panicked", run_id);
                reporter.error(
                    "Automation failed during worker (SessionError): automation worker panicked",
                );
                panicked(run_id)
            }
        };
        let thread = std::thread::Builder::new()
            .name(format!("gst-run-{}", &run_id.simple().to_string()[..8]))
            .spawn(worker)
            .map_err(|e| AutomationError::Session(format!("cannot start worker thread: {}", e)))?;

        tracing::info!("Started automation run {}", run_id);
        Ok(RunHandle {
            run_id,
            thread: Some(thread),
            cancel,
            runtime: self.runtime.handle().clone(),
        })
    }

    /// Start and wait for the outcome.
    pub fn run_blocking(
        &self,
        request: AutomationRequest,
        sink: Arc<dyn StatusSink>,
    ) -> Result<RunOutcome, AutomationError> {
        Ok(self.start(request, sink)?.join())
    }

    /// Sessions currently open, including retained ones.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.active_sessions()
    }

    /// Terminate every open browser. In-flight runs fail with a session
    /// error. Returns how many sessions were closed.
    pub fn close_active(&self) -> usize {
        let sessions = self.sessions.clone();
        let handle = self.runtime.handle().clone();
        // Own thread so this is safe to call from inside a runtime too.
        std::thread::spawn(move || handle.block_on(sessions.close_all()))
            .join()
            .unwrap_or(0)
    }

    /// Block the calling thread on `future` using the service runtime.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Hands the running session's driver to `cancel`.
struct CancelSlot<D> {
    inner: Mutex<CancelState<D>>,
}

struct CancelState<D> {
    cancelled: bool,
    driver: Option<D>,
}

impl<D> Default for CancelSlot<D> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(CancelState {
                cancelled: false,
                driver: None,
            }),
        }
    }
}

impl<D: PageDriver> CancelSlot<D> {
    fn lock(&self) -> std::sync::MutexGuard<'_, CancelState<D>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `false` if the run was cancelled before its browser came up.
    fn attach(&self, driver: D) -> bool {
        let mut state = self.lock();
        if state.cancelled {
            return false;
        }
        state.driver = Some(driver);
        true
    }

    fn detach(&self) {
        self.lock().driver = None;
    }

    fn cancel(&self) -> Option<D> {
        let mut state = self.lock();
        state.cancelled = true;
        state.driver.take()
    }
}

/// A started run.
pub struct RunHandle<D: PageDriver> {
    run_id: Uuid,
    thread: Option<JoinHandle<RunOutcome>>,
    cancel: Arc<CancelSlot<D>>,
    runtime: Handle,
}

impl<D: PageDriver> RunHandle<D> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Terminate the run's browser. The run then fails with a session
    /// error at its next browser call.
    pub fn cancel(&self) {
        tracing::warn!("Cancelling run {}", self.run_id);
        if let Some(driver) = self.cancel.cancel() {
            self.runtime.spawn(async move {
                if let Err(err) = driver.shutdown().await {
                    tracing::debug!("Shutdown on cancel: {}", err);
                }
            });
        }
    }

    /// Wait for the run to finish.
    pub fn join(mut self) -> RunOutcome {
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            _ => panicked(self.run_id),
        }
    }
}

fn panicked(run_id: Uuid) -> RunOutcome {
    RunOutcome {
        run_id,
        success: false,
        final_state: WorkflowState::Failed.to_string(),
        visited: vec![WorkflowState::Failed.to_string()],
        failure: Some(RunFailure {
            step: "worker".to_string(),
            kind: "SessionError".to_string(),
            message: "automation worker panicked".to_string(),
        }),
        screenshot: None,
        session_retained: false,
    }
}

/// One full run: open, work, release, summarize.
async fn execute<L: BrowserLauncher>(
    run_id: Uuid,
    sessions: SessionManager<L>,
    config: Arc<AutomationConfig>,
    request: AutomationRequest,
    reporter: StatusReporter,
    cancel: Arc<CancelSlot<L::Driver>>,
) -> RunOutcome {
    let mut outcome = RunOutcome {
        run_id,
        success: false,
        final_state: WorkflowState::Init.to_string(),
        visited: vec![WorkflowState::Init.to_string()],
        failure: None,
        screenshot: None,
        session_retained: false,
    };

    reporter.info(format!(
        "Starting automation for {}",
        request.credentials
    ));
    reporter.info(format!(
        "Downloads will be saved to: {}",
        config.download_dir.display()
    ));
    reporter.info("Initializing Chrome browser...");

    let options = LaunchOptions {
        headless: config.headless,
        download_dir: config.download_dir.clone(),
    };
    let session = match sessions.open(&options).await {
        Ok(session) => session,
        Err(error) => {
            return summarize(outcome, &reporter, Some(("launch", error, None)));
        }
    };

    if !cancel.attach(session.driver().clone()) {
        session.close().await;
        reporter.info("Browser closed.");
        let error = AutomationError::Session("run cancelled".to_string());
        return summarize(outcome, &reporter, Some(("launch", error, None)));
    }

    let mut workflow = Workflow::new(session.driver().clone(), config.clone(), reporter.clone());
    let result = workflow.run(&request).await;
    cancel.detach();

    outcome.final_state = workflow.state().to_string();
    outcome.visited = workflow.visited().iter().map(|s| s.to_string()).collect();

    if request.keep_open && session.driver().is_alive() {
        session.retain();
        outcome.session_retained = true;
        reporter.info("Browser will remain open for continued use");
        reporter.info("Note: close the browser when finished");
    } else {
        if session.driver().is_alive() {
            pause(config.settle.before_close).await;
        }
        session.close().await;
        reporter.info("Browser closed.");
    }

    let failure = result.err().map(
        |WorkflowFailure {
             step,
             error,
             screenshot,
         }| (step.name(), error, screenshot),
    );
    summarize(outcome, &reporter, failure)
}

/// Fill in the outcome and emit the final summary event.
fn summarize(
    mut outcome: RunOutcome,
    reporter: &StatusReporter,
    failure: Option<(&str, AutomationError, Option<PathBuf>)>,
) -> RunOutcome {
    match failure {
        None => {
            outcome.success = true;
            reporter.success("Automation actions completed (or reached selected point).");
        }
        Some((step, error, screenshot)) => {
            reporter.error(format!(
                "Automation failed during {} ({}): {}",
                step,
                error.kind(),
                error
            ));
            outcome.final_state = WorkflowState::Failed.to_string();
            if outcome.visited.last().map(String::as_str) != Some("Failed") {
                outcome.visited.push(WorkflowState::Failed.to_string());
            }
            outcome.screenshot = screenshot;
            outcome.failure = Some(RunFailure {
                step: step.to_string(),
                kind: error.kind().to_string(),
                message: error.to_string(),
            });
        }
    }
    outcome
}
