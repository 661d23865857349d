//! Session recovery: reload or re-navigate, then wait for the inbox table.

use super::bridge::safe_evaluate;
use super::health::{check_health, is_expected_url, is_login_url, login_matcher};
use super::scripts::PageScript;
use super::table::await_table_loaded;
use crate::browser::{BrowserSession, SessionError};
use crate::core::config::PortalConfig;
use crate::core::error::{PortalError, PortalResult};
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Navigation attempts before recovery gives up on the direct path.
const NAV_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub recovered: bool,
    pub row_count: usize,
}

impl RecoveryReport {
    fn failed() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct Dismissed {
    #[serde(default)]
    dismissed: usize,
}

/// Common tail of both recovery paths. A login redirect is the only error.
async fn settle_after_navigation(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
) -> PortalResult<RecoveryReport> {
    match session.current_url().await {
        Ok(url) if is_login_url(&url, &login_matcher(cfg)) => {
            warn!("recovery: redirected to login ({})", url);
            return Err(PortalError::SessionExpired(url));
        }
        Ok(_) => {}
        Err(e) => {
            warn!("recovery: url unreadable after navigation: {}", e);
            return Ok(RecoveryReport::failed());
        }
    }

    if let Some(d) =
        safe_evaluate::<Dismissed>(session, &PageScript::dismiss_overlay_dialogs(cfg)).await
    {
        if d.dismissed > 0 {
            debug!("recovery: dismissed {} overlay dialog(s)", d.dismissed);
        }
    }

    let state = await_table_loaded(session, cfg, cfg.recovery_timeout()).await;
    Ok(RecoveryReport {
        recovered: state.is_loaded(),
        row_count: state.row_count(),
    })
}

async fn navigate_to_inbox(session: &dyn BrowserSession, url: &str) -> Result<(), SessionError> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(4))
        .with_max_elapsed_time(None)
        .build();

    let mut attempts = 0u32;
    retry(policy, || {
        attempts += 1;
        let attempt = attempts;
        async move {
            match session.goto(url).await {
                Ok(()) => Ok(()),
                Err(SessionError::Closed) => Err(backoff::Error::permanent(SessionError::Closed)),
                Err(e) if attempt >= NAV_ATTEMPTS => Err(backoff::Error::permanent(e)),
                Err(e) => {
                    debug!("recovery: navigation attempt {} failed: {}", attempt, e);
                    Err(backoff::Error::transient(e))
                }
            }
        }
    })
    .await
}

/// Try to bring the session back to a loaded inbox table.
///
/// Reload first when the page is on (or near) the inbox or its JS context is
/// dead; otherwise, or when the reload does not produce a table, navigate to
/// the inbox URL. A login redirect ends recovery immediately with
/// [`PortalError::SessionExpired`]; every other failure is an unrecovered report.
pub async fn recover(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
) -> PortalResult<RecoveryReport> {
    let health = check_health(session, cfg).await;
    if !health.alive {
        warn!("recovery: session is gone, nothing to recover");
        return Ok(RecoveryReport::failed());
    }

    let near_inbox = health
        .url
        .as_deref()
        .map(|u| is_expected_url(u, &cfg.inbox_url, &login_matcher(cfg)))
        .unwrap_or(false);

    if near_inbox || !health.context_responsive {
        info!("recovery: reloading (near_inbox={}, responsive={})", near_inbox, health.context_responsive);
        match session.reload().await {
            Ok(()) => {
                let report = settle_after_navigation(session, cfg).await?;
                if report.recovered {
                    log_report(&report);
                    return Ok(report);
                }
                warn!("recovery: reload did not bring the table back");
            }
            Err(e) => warn!("recovery: reload failed: {}", e),
        }
    }

    if cfg.inbox_url.trim().is_empty() {
        warn!("recovery: no inbox url configured, cannot navigate");
        return Ok(RecoveryReport::failed());
    }

    info!("recovery: navigating to {}", cfg.inbox_url);
    if let Err(e) = navigate_to_inbox(session, &cfg.inbox_url).await {
        warn!("recovery: navigation failed: {}", e);
        return Ok(RecoveryReport::failed());
    }
    let report = settle_after_navigation(session, cfg).await?;
    log_report(&report);
    Ok(report)
}

fn log_report(report: &RecoveryReport) {
    if report.recovered {
        info!("✅ recovery: table back with {} row(s)", report.row_count);
    } else {
        warn!("recovery: failed");
    }
}
