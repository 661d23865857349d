//! Browser discovery and launch using `chromiumoxide`.
//!
//! This module is the **single source of truth** for:
//! * Finding a usable browser executable (env override → PATH → well-known paths).
//! * Building a `BrowserConfig` for the inbox session (visible by default: the
//!   operator logs in by hand before the pipeline takes over).
//! * Owning the browser process and its CDP handler loop (`BrowserHandle`).
//!
//! The inbox pipeline itself never touches this module; it only sees the
//! `ChromiumSession` handed out by `BrowserHandle::session()`.

use super::chromium::ChromiumSession;
use crate::core::config;
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::{Browser, Handler};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "msedge",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch options / config builder ──────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Persistent profile so a finished login survives restarts.
    pub profile_dir: Option<PathBuf>,
    pub executable: Option<String>,
}

/// Default persistent profile under `~/.notice-scout/profile`.
pub fn default_profile_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".notice-scout").join("profile"))
}

/// Build a `BrowserConfig` for the inbox session.
///
/// Downloads are never written to disk by the browser: the PDF is captured from
/// the network layer, so no download behaviour is configured here.
pub fn build_session_config(exe: &str, opts: &LaunchOptions) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .window_size(1440, 960)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-infobars")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-popup-blocking")
        .arg("--disable-blink-features=AutomationControlled");

    if opts.headless {
        builder = builder.arg("--disable-gpu").arg("--hide-scrollbars");
    } else {
        // Visible window: let the page use the real window size.
        builder = builder.with_head().viewport(None);
    }

    if let Some(dir) = opts.profile_dir.as_ref() {
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Browser handle ───────────────────────────────────────────────────────────

/// Owns the browser process, its handler loop and the single working tab.
pub struct BrowserHandle {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    session: ChromiumSession,
}

fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromiumoxide handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

impl BrowserHandle {
    pub async fn launch(opts: &LaunchOptions) -> Result<Self> {
        let exe = opts
            .executable
            .clone()
            .or_else(find_chrome_executable)
            .ok_or_else(|| {
                anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
            })?;

        if let Some(dir) = opts.profile_dir.as_ref() {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow!("Failed to create profile dir {}: {}", dir.display(), e))?;
        }

        info!(
            "🚀 launching browser ({}, headless={})",
            exe, opts.headless
        );
        let config = build_session_config(&exe, opts)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open tab: {}", e))?;

        Ok(Self {
            browser,
            handler_task,
            session: ChromiumSession::new(page, closed),
        })
    }

    pub fn session(&self) -> &ChromiumSession {
        &self.session
    }

    /// Gracefully close the browser.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        info!("🛑 browser shut down");
    }
}
