//! Paginator control: read the page indicator, step pages, confirm the reload.

use super::bridge::safe_evaluate;
use super::scripts::{PageScript, PaginatorTarget};
use super::table::await_table_loaded;
use crate::browser::BrowserSession;
use crate::core::config::PortalConfig;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginatorSnapshot {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub next_present: bool,
    #[serde(default)]
    pub next_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct Clicked {
    #[serde(default)]
    clicked: bool,
}

fn indicator_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s*(?:/|\bof\b|\bde\b)\s*(\d+)").ok())
        .as_ref()
}

/// Parse `(current, total)` out of texts like `(2 of 5)`, `Página 2 de 5`, `2/5`.
pub fn parse_page_indicator(text: &str) -> Option<(u32, u32)> {
    let caps = indicator_re()?.captures(text)?;
    let current = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let total = caps.get(2)?.as_str().parse::<u32>().ok()?;
    if current == 0 || total == 0 || current > total {
        return None;
    }
    Some((current, total))
}

async fn snapshot(session: &dyn BrowserSession, cfg: &PortalConfig) -> Option<PaginatorSnapshot> {
    safe_evaluate::<PaginatorSnapshot>(session, &PageScript::paginator_state(cfg)).await
}

/// Whether a later page exists. Trusts the indicator when it parses, the
/// state of the "next" control otherwise.
pub async fn has_next_page(session: &dyn BrowserSession, cfg: &PortalConfig) -> bool {
    let Some(snap) = snapshot(session, cfg).await else {
        return false;
    };
    if let Some((current, total)) = snap.text.as_deref().and_then(parse_page_indicator) {
        return current < total;
    }
    snap.next_present && snap.next_enabled
}

/// Current page as reported by the indicator.
pub async fn current_page(session: &dyn BrowserSession, cfg: &PortalConfig) -> Option<u32> {
    let snap = snapshot(session, cfg).await?;
    snap.text
        .as_deref()
        .and_then(parse_page_indicator)
        .map(|(current, _)| current)
}

async fn click(session: &dyn BrowserSession, cfg: &PortalConfig, target: PaginatorTarget) -> bool {
    let clicked = safe_evaluate::<Clicked>(session, &PageScript::click_paginator(cfg, target))
        .await
        .map(|c| c.clicked)
        .unwrap_or(false);
    if !clicked {
        debug!("pagination: {:?} control not clickable", target);
    }
    clicked
}

async fn confirm_reload(session: &dyn BrowserSession, cfg: &PortalConfig, target: PaginatorTarget) -> bool {
    tokio::time::sleep(cfg.settle_delay()).await;
    let state = await_table_loaded(session, cfg, cfg.table_load_timeout()).await;
    if !state.is_loaded() {
        warn!("pagination: table did not reload after {:?}", target);
        return false;
    }
    true
}

async fn click_and_confirm(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    target: PaginatorTarget,
) -> bool {
    click(session, cfg, target).await && confirm_reload(session, cfg, target).await
}

pub async fn go_to_next_page(session: &dyn BrowserSession, cfg: &PortalConfig) -> bool {
    if !has_next_page(session, cfg).await {
        return false;
    }
    click_and_confirm(session, cfg, PaginatorTarget::Next).await
}

/// Navigation without a page indicator: the numbered link, or for page 1,
/// stepping back until "previous" is no longer clickable.
async fn go_to_page_blind(session: &dyn BrowserSession, cfg: &PortalConfig, n: u32) -> bool {
    if click_and_confirm(session, cfg, PaginatorTarget::Page(n)).await {
        return true;
    }
    if n != 1 {
        warn!("pagination: no indicator and no link to page {}", n);
        return false;
    }
    for _ in 0..cfg.thresholds.max_pages {
        if !click(session, cfg, PaginatorTarget::Prev).await {
            return true;
        }
        if !confirm_reload(session, cfg, PaginatorTarget::Prev).await {
            return false;
        }
    }
    warn!("pagination: still not on the first page after {} steps", cfg.thresholds.max_pages);
    false
}

/// Move to page `n` (1-based). True immediately when already there.
///
/// Tries the numbered page link first and falls back to stepping with
/// next/prev, never taking more than `thresholds.max_pages` steps.
pub async fn go_to_page(session: &dyn BrowserSession, cfg: &PortalConfig, n: u32) -> bool {
    let max_pages = cfg.thresholds.max_pages;
    if n == 0 || n > max_pages {
        warn!("pagination: page {} outside 1..={}", n, max_pages);
        return false;
    }

    let Some(mut current) = current_page(session, cfg).await else {
        return go_to_page_blind(session, cfg, n).await;
    };
    if current == n {
        return true;
    }

    info!("pagination: {} -> {}", current, n);
    if click_and_confirm(session, cfg, PaginatorTarget::Page(n)).await {
        match current_page(session, cfg).await {
            Some(p) if p == n => return true,
            Some(p) => current = p,
            None => return true,
        }
    }

    let mut steps = 0;
    while current != n && steps < max_pages {
        let target = if current < n {
            PaginatorTarget::Next
        } else {
            PaginatorTarget::Prev
        };
        if !click_and_confirm(session, cfg, target).await {
            return false;
        }
        steps += 1;
        match current_page(session, cfg).await {
            Some(p) => current = p,
            None => return false,
        }
    }
    current == n
}
