//! Date-range filter on the inbox search form.
//!
//! The date-picker inputs ignore programmatic value assignment, so values are
//! typed one key at a time after focus + select-all + delete.

use super::bridge::{safe_evaluate, safe_execute};
use super::scripts::PageScript;
use super::table::await_table_loaded;
use crate::browser::{BrowserSession, Key};
use crate::core::config::PortalConfig;
use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::distr::{Distribution, Uniform};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// `[today - days_back, today]`.
    pub fn default_range(today: NaiveDate, days_back: i64) -> Self {
        Self {
            from: today - ChronoDuration::days(days_back.max(0)),
            to: today,
        }
    }

    pub fn parse(from: &str, to: &str, format: &str) -> Option<Self> {
        let from = NaiveDate::parse_from_str(from.trim(), format).ok()?;
        let to = NaiveDate::parse_from_str(to.trim(), format).ok()?;
        (from <= to).then_some(Self { from, to })
    }

    pub fn formatted(&self, format: &str) -> (String, String) {
        (
            self.from.format(format).to_string(),
            self.to.format(format).to_string(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct Found {
    #[serde(default)]
    found: bool,
}

#[derive(Debug, Deserialize)]
struct SearchClick {
    #[serde(default)]
    clicked: bool,
    #[serde(default)]
    via: Option<String>,
}

fn key_delay(base_ms: u64) -> Duration {
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let jitter = {
        let mut rng = rand::rng();
        Uniform::new(0u64, base_ms)
            .map(|d| d.sample(&mut rng))
            .unwrap_or(0)
    };
    Duration::from_millis(base_ms + jitter)
}

async fn type_into(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    selector: &str,
    value: &str,
) -> bool {
    let focus = PageScript::FocusAndSelect {
        selector: selector.to_string(),
    };
    let found = safe_evaluate::<Found>(session, &focus)
        .await
        .map(|f| f.found)
        .unwrap_or(false);
    if !found {
        warn!("date_filter: input {} not found", selector);
        return false;
    }

    if let Err(e) = session.press_key(Key::Backspace).await {
        warn!("date_filter: clearing {} failed: {}", selector, e);
        return false;
    }
    for c in value.chars() {
        if let Err(e) = session.press_key(Key::Char(c)).await {
            warn!("date_filter: typing into {} failed: {}", selector, e);
            return false;
        }
        tokio::time::sleep(key_delay(cfg.polling.key_delay_ms)).await;
    }

    let blur = PageScript::BlurInput {
        selector: selector.to_string(),
        popup: cfg.selectors.date_popup.clone(),
    };
    safe_execute(session, &blur).await;
    true
}

/// Fill both date inputs, submit the search and wait for the table.
///
/// `false` means the filter could not be applied; callers then use the table
/// as it is.
pub async fn apply_date_filter(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    range: Option<DateRange>,
) -> bool {
    let range = range.unwrap_or_else(|| {
        DateRange::default_range(chrono::Local::now().date_naive(), cfg.date_filter.days_back)
    });
    let (from, to) = range.formatted(&cfg.date_filter.format);
    info!("date_filter: applying {} .. {}", from, to);

    if !type_into(session, cfg, &cfg.selectors.date_from, &from).await {
        return false;
    }
    if !type_into(session, cfg, &cfg.selectors.date_to, &to).await {
        return false;
    }

    let search = safe_evaluate::<SearchClick>(session, &PageScript::click_search(cfg)).await;
    match search {
        Some(SearchClick { clicked: true, via }) => {
            debug!("date_filter: search clicked via {}", via.as_deref().unwrap_or("?"));
        }
        _ => {
            warn!("date_filter: search control not found");
            return false;
        }
    }

    tokio::time::sleep(cfg.settle_delay()).await;
    let state = await_table_loaded(session, cfg, cfg.table_load_timeout()).await;
    if !state.is_loaded() {
        warn!("date_filter: table not loaded after search ({:?})", state);
        return false;
    }
    true
}
