//! Document engine lifecycle
//!
//! The headless browser used for paginated output is expensive to launch and
//! may be missing entirely in constrained deployments. `EngineLifecycleManager`
//! owns the single engine handle: it launches lazily on first use, makes at
//! most one launch attempt per process lifetime, and closes the engine on
//! shutdown. Renderers only borrow the handle to print a document.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{ConversionStage, Error, Result};

/// Physical page size in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_in: f64,
    pub height_in: f64,
}

impl PageSize {
    pub const A4_LANDSCAPE: PageSize = PageSize {
        width_in: 11.69,
        height_in: 8.27,
    };
}

/// A running document engine. Implementations block; callers run them on
/// the blocking pool.
pub trait DocumentEngine: Send + Sync {
    /// Lay out `html` on pages of `page` size and return the PDF bytes.
    /// Must not close the engine itself.
    fn print_pdf(&self, html: &str, page: PageSize) -> Result<Vec<u8>>;

    /// Terminate the engine process.
    fn close(&self) -> Result<()>;
}

/// Starts a document engine. Called at most once per manager.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self, config: &LaunchConfig) -> Result<Arc<dyn DocumentEngine>>;
}

/// Launch settings for the headless browser.
///
/// Defaults target containers: no sandbox, single process, no GPU and a
/// bounded launch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
    pub headless: bool,
    /// Chrome's sandbox needs privileges most containers do not grant
    pub sandbox: bool,
    pub single_process: bool,
    /// Launch attempts taking longer than this count as failed
    pub launch_timeout_ms: u64,
    pub extra_args: Vec<String>,
    /// Browser binary; autodetected when unset
    pub chrome_path: Option<PathBuf>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            single_process: true,
            launch_timeout_ms: 30_000,
            extra_args: vec![
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--no-zygote".to_string(),
            ],
            chrome_path: None,
        }
    }
}

/// Launcher that always fails; used when no browser backend is compiled in.
pub struct UnavailableLauncher {
    reason: String,
}

impl UnavailableLauncher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl EngineLauncher for UnavailableLauncher {
    fn launch(&self, _config: &LaunchConfig) -> Result<Arc<dyn DocumentEngine>> {
        Err(Error::InitializationError(self.reason.clone()))
    }
}

/// The launcher for the compiled-in backend.
#[cfg(feature = "cdp")]
pub fn default_launcher() -> Arc<dyn EngineLauncher> {
    Arc::new(crate::cdp::ChromeLauncher)
}

#[cfg(not(feature = "cdp"))]
pub fn default_launcher() -> Arc<dyn EngineLauncher> {
    Arc::new(UnavailableLauncher::new("built without the `cdp` feature"))
}

/// Observable engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    /// Terminal: the manager never retries
    Failed(String),
}

enum Slot {
    Uninitialized,
    Ready(Arc<dyn DocumentEngine>),
    Failed(String),
}

const STATUS_UNINITIALIZED: u8 = 0;
const STATUS_READY: u8 = 1;
const STATUS_FAILED: u8 = 2;

/// Counters reported by `EngineLifecycleManager::stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub state: EngineState,
    pub launch_attempts: u64,
    pub documents_printed: u64,
}

/// Owns the process-wide document engine handle.
pub struct EngineLifecycleManager {
    launcher: Arc<dyn EngineLauncher>,
    config: LaunchConfig,
    // Held across the launch so concurrent first users wait for one attempt
    slot: Arc<Mutex<Slot>>,
    status: Arc<AtomicU8>,
    launch_attempts: AtomicU64,
    documents_printed: AtomicU64,
}

impl EngineLifecycleManager {
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: LaunchConfig) -> Self {
        Self {
            launcher,
            config,
            slot: Arc::new(Mutex::new(Slot::Uninitialized)),
            status: Arc::new(AtomicU8::new(STATUS_UNINITIALIZED)),
            launch_attempts: AtomicU64::new(0),
            documents_printed: AtomicU64::new(0),
        }
    }

    /// Manager for the compiled-in browser backend.
    pub fn with_default_launcher(config: LaunchConfig) -> Self {
        Self::new(default_launcher(), config)
    }

    /// Return the engine, launching it on the first call.
    ///
    /// Only one launch is ever attempted. After a failure every call returns
    /// `Error::EngineUnavailable` without touching the launcher again.
    ///
    /// The attempt runs in its own task that owns the state lock, so a caller
    /// dropped mid-launch only stops waiting; the outcome is still recorded.
    pub async fn initialize(&self) -> Result<Arc<dyn DocumentEngine>> {
        let mut slot = self.slot.clone().lock_owned().await;
        match &*slot {
            Slot::Ready(engine) => return Ok(engine.clone()),
            Slot::Failed(reason) => return Err(Error::EngineUnavailable(reason.clone())),
            Slot::Uninitialized => {}
        }

        self.launch_attempts.fetch_add(1, Ordering::SeqCst);
        let launcher = self.launcher.clone();
        let config = self.config.clone();
        let status = self.status.clone();

        let attempt = tokio::spawn(async move {
            match launch_with_timeout(launcher, config).await {
                Ok(engine) => {
                    info!("Document engine ready");
                    *slot = Slot::Ready(engine.clone());
                    status.store(STATUS_READY, Ordering::SeqCst);
                    Ok(engine)
                }
                Err(reason) => {
                    error!("Document engine unavailable, paginated output will fall back to SVG: {}", reason);
                    *slot = Slot::Failed(reason.clone());
                    status.store(STATUS_FAILED, Ordering::SeqCst);
                    Err(Error::EngineUnavailable(reason))
                }
            }
        });

        attempt
            .await
            .map_err(|e| Error::EngineUnavailable(format!("launch task aborted: {}", e)))?
    }

    /// Print `html` to PDF on the shared engine, launching it if needed.
    ///
    /// `Error::EngineUnavailable` means no engine could be obtained; any
    /// failure reported by a running engine becomes a PDF conversion error.
    pub async fn print_pdf(&self, html: String, page: PageSize) -> Result<Vec<u8>> {
        let engine = self.initialize().await?;
        let bytes = tokio::task::spawn_blocking(move || engine.print_pdf(&html, page))
            .await
            .map_err(|e| Error::conversion(ConversionStage::Pdf, format!("print task aborted: {}", e)))?
            .map_err(|e| match e {
                Error::Conversion { .. } => e,
                other => Error::conversion(ConversionStage::Pdf, other),
            })?;
        self.documents_printed.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }

    /// True only once the engine is launched and not shut down.
    pub fn is_available(&self) -> bool {
        self.status.load(Ordering::SeqCst) == STATUS_READY
    }

    pub async fn state(&self) -> EngineState {
        match &*self.slot.lock().await {
            Slot::Uninitialized => EngineState::Uninitialized,
            Slot::Ready(_) => EngineState::Ready,
            Slot::Failed(reason) => EngineState::Failed(reason.clone()),
        }
    }

    /// Put the manager in its terminal failed state, closing a running engine.
    pub async fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut slot = self.slot.lock().await;
        if let Slot::Ready(engine) = std::mem::replace(&mut *slot, Slot::Failed(reason.clone())) {
            close_engine(engine).await;
        }
        self.status.store(STATUS_FAILED, Ordering::SeqCst);
        warn!("Document engine disabled: {}", reason);
    }

    /// Close the engine if running and reset the counters. Idempotent.
    ///
    /// A failed manager stays failed; a ready one returns to uninitialized.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Uninitialized) {
            Slot::Ready(engine) => {
                close_engine(engine).await;
                self.status.store(STATUS_UNINITIALIZED, Ordering::SeqCst);
                info!("Document engine shut down");
            }
            other => *slot = other,
        }
        self.launch_attempts.store(0, Ordering::SeqCst);
        self.documents_printed.store(0, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            state: self.state().await,
            launch_attempts: self.launch_attempts.load(Ordering::SeqCst),
            documents_printed: self.documents_printed.load(Ordering::SeqCst),
        }
    }
}

/// Run `launcher` on the blocking pool, bounded by the launch timeout.
async fn launch_with_timeout(
    launcher: Arc<dyn EngineLauncher>,
    config: LaunchConfig,
) -> std::result::Result<Arc<dyn DocumentEngine>, String> {
    let timeout_ms = config.launch_timeout_ms;
    info!("Launching document engine (timeout {}ms)", timeout_ms);
    let launch = tokio::task::spawn_blocking(move || launcher.launch(&config));

    match tokio::time::timeout(Duration::from_millis(timeout_ms), launch).await {
        Ok(Ok(Ok(engine))) => Ok(engine),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(join_err)) => Err(format!("launch task aborted: {}", join_err)),
        Err(_) => Err(Error::Timeout(timeout_ms).to_string()),
    }
}

async fn close_engine(engine: Arc<dyn DocumentEngine>) {
    match tokio::task::spawn_blocking(move || engine.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Error while closing document engine: {}", e),
        Err(e) => warn!("Close task aborted: {}", e),
    }
}
