//! Session health probe.

use super::bridge::safe_evaluate;
use super::matchers::KeywordMatcher;
use super::scripts::PageScript;
use crate::browser::BrowserSession;
use crate::core::config::PortalConfig;
use crate::core::types::SessionHealth;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct HealthProbe {
    #[serde(default)]
    has_table: bool,
    #[serde(default)]
    row_count: usize,
}

pub(crate) fn login_matcher(cfg: &PortalConfig) -> KeywordMatcher {
    KeywordMatcher::new(&cfg.login_url_markers)
}

/// Path and query of `url`, or the whole string when it does not parse.
fn local_part(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => match u.query() {
            Some(q) => format!("{}?{}", u.path(), q),
            None => u.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// Whether `url` is a login / auth page.
pub fn is_login_url(url: &str, login: &KeywordMatcher) -> bool {
    login.is_match(&local_part(url))
}

/// Same host as the inbox, under the inbox's directory, and not a login page.
pub fn is_expected_url(current: &str, inbox: &str, login: &KeywordMatcher) -> bool {
    if is_login_url(current, login) {
        return false;
    }
    let (Ok(cur), Ok(inb)) = (Url::parse(current), Url::parse(inbox)) else {
        return false;
    };
    if cur.host_str() != inb.host_str() {
        return false;
    }
    let dir = match inb.path().rfind('/') {
        Some(i) => &inb.path()[..=i],
        None => "/",
    };
    cur.path().starts_with(dir)
}

/// Fresh health snapshot. Never cached by callers.
pub async fn check_health(session: &dyn BrowserSession, cfg: &PortalConfig) -> SessionHealth {
    if session.is_closed() {
        warn!("health: session closed");
        return SessionHealth::dead();
    }
    let url = match session.current_url().await {
        Ok(u) => u,
        Err(e) => {
            warn!("health: url unreadable: {}", e);
            return SessionHealth::dead();
        }
    };

    let url_ok = is_expected_url(&url, &cfg.inbox_url, &login_matcher(cfg));
    let probe = safe_evaluate::<HealthProbe>(session, &PageScript::health_probe(cfg)).await;

    let health = match probe {
        Some(p) => SessionHealth {
            alive: true,
            on_expected_page: url_ok && p.has_table,
            context_responsive: true,
            row_count: Some(p.row_count),
            url: Some(url),
        },
        None => SessionHealth {
            alive: true,
            on_expected_page: url_ok,
            context_responsive: false,
            row_count: None,
            url: Some(url),
        },
    };
    debug!("health: {:?}", health);
    health
}
