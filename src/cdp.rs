//! Chrome DevTools Protocol document engine (uses the `headless_chrome` crate)

use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as Base64Engine;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};

use crate::engine::{DocumentEngine, EngineLauncher, LaunchConfig, PageSize};
use crate::{ConversionStage, Error, Result};

// The transport drops browsers that stay idle longer than this; renders can
// be hours apart.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Launches a headless Chrome/Chromium process.
pub struct ChromeLauncher;

impl EngineLauncher for ChromeLauncher {
    fn launch(&self, config: &LaunchConfig) -> Result<Arc<dyn DocumentEngine>> {
        let mut args: Vec<&OsStr> = config.extra_args.iter().map(OsStr::new).collect();
        if config.single_process {
            args.push(OsStr::new("--single-process"));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(config.sandbox)
            .path(config.chrome_path.clone())
            .args(args)
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        debug!("Chrome launched (sandbox: {}, single process: {})", config.sandbox, config.single_process);
        Ok(Arc::new(ChromeEngine {
            browser: Mutex::new(Some(browser)),
        }))
    }
}

/// A running browser. Every print uses its own tab, closed afterwards.
pub struct ChromeEngine {
    browser: Mutex<Option<Browser>>,
}

impl ChromeEngine {
    fn browser(&self) -> Result<Browser> {
        let guard = self
            .browser
            .lock()
            .map_err(|_| Error::conversion(ConversionStage::Pdf, "Chrome handle lock poisoned"))?;
        guard
            .clone()
            .ok_or_else(|| Error::conversion(ConversionStage::Pdf, "browser already closed"))
    }
}

impl DocumentEngine for ChromeEngine {
    fn print_pdf(&self, html: &str, page: PageSize) -> Result<Vec<u8>> {
        let browser = self.browser()?;
        let tab = browser
            .new_tab()
            .map_err(|e| Error::conversion(ConversionStage::Pdf, format!("Failed to open tab: {}", e)))?;

        let url = format!(
            "data:text/html;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(html)
        );

        let printed = tab
            .navigate_to(&url)
            .and_then(|t| t.wait_until_navigated())
            .map_err(|e| Error::conversion(ConversionStage::Pdf, format!("Failed to set content: {}", e)))
            .and_then(|t| {
                t.print_to_pdf(Some(PrintToPdfOptions {
                    landscape: Some(page.width_in > page.height_in),
                    print_background: Some(true),
                    paper_width: Some(page.width_in),
                    paper_height: Some(page.height_in),
                    margin_top: Some(0.0),
                    margin_bottom: Some(0.0),
                    margin_left: Some(0.0),
                    margin_right: Some(0.0),
                    prefer_css_page_size: Some(true),
                    ..Default::default()
                }))
                .map_err(|e| Error::conversion(ConversionStage::Pdf, format!("Failed to print: {}", e)))
            });

        // Close the page whatever happened; the browser stays up.
        if let Err(e) = tab.close(false) {
            warn!("Failed to close print tab: {}", e);
        }
        printed
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .browser
            .lock()
            .map_err(|_| Error::Other("Chrome handle lock poisoned".into()))?;
        // Dropping the last Browser handle terminates the child process.
        drop(guard.take());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_print() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        let engine = match ChromeLauncher.launch(&LaunchConfig::default()) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Skipping Chrome print test because Chrome is not available or failed to launch: {}", e);
                return;
            }
        };
        let pdf = engine
            .print_pdf("<html><body><svg width=\"10\" height=\"10\"></svg></body></html>", PageSize::A4_LANDSCAPE)
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        engine.close().unwrap();
        let err = engine.print_pdf("<html></html>", PageSize::A4_LANDSCAPE).unwrap_err();
        assert!(err.to_string().starts_with("PDF conversion failed:"));
    }
}
