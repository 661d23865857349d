//! Table-state detection.
//!
//! The datatable gives no completion signal after an AJAX rebuild, so the
//! state is polled and a loaded read is only trusted once a second read, taken
//! after the settle delay, agrees with it.

use super::bridge::safe_evaluate;
use super::matchers::KeywordMatcher;
use super::poll::{poll_until, PollSpec, Polled, Probe};
use super::scripts::PageScript;
use crate::browser::BrowserSession;
use crate::core::config::PortalConfig;
use crate::core::types::TableState;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Raw single read of the table region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TableSnapshot {
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub table_present: bool,
    #[serde(default)]
    pub row_count: usize,
    /// The framework's own empty-message row is present.
    #[serde(default)]
    pub empty_row: bool,
    /// Body text, only sent when no data rows were counted.
    #[serde(default)]
    pub text: Option<String>,
}

impl TableSnapshot {
    /// Derive the table state from one read.
    ///
    /// A body with zero data rows and no explicit empty indicator is reported
    /// as `Loading`: that is what the table looks like halfway through a rebuild.
    pub fn state(&self, no_results: &KeywordMatcher) -> TableState {
        if self.loading {
            return TableState::Loading;
        }
        if !self.table_present {
            return TableState::Absent;
        }
        if self.row_count > 0 {
            return TableState::LoadedWithRows(self.row_count);
        }
        let phrase = self
            .text
            .as_deref()
            .map(|t| no_results.is_match(t))
            .unwrap_or(false);
        if self.empty_row || phrase {
            TableState::LoadedEmpty
        } else {
            TableState::Loading
        }
    }
}

pub(crate) fn no_results_matcher(cfg: &PortalConfig) -> KeywordMatcher {
    KeywordMatcher::new(&cfg.keywords.no_results)
}

async fn read_state(
    session: &dyn BrowserSession,
    script: &PageScript,
    no_results: &KeywordMatcher,
) -> Option<TableState> {
    safe_evaluate::<TableSnapshot>(session, script)
        .await
        .map(|snap| snap.state(no_results))
}

/// Single read without waiting. `None` when the page cannot be queried.
pub async fn peek_table_state(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
) -> Option<TableState> {
    let script = PageScript::table_snapshot(cfg);
    let state = read_state(session, &script, &no_results_matcher(cfg)).await;
    debug!("table: peek -> {:?}", state);
    state
}

/// Poll until the table is stably loaded or `max_wait` elapses.
///
/// Returns a loaded state (`LoadedWithRows` / `LoadedEmpty`) only after two
/// agreeing reads; on timeout returns the last non-loaded observation, or
/// `Loading` when nothing could be read.
pub async fn await_table_loaded(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    max_wait: Duration,
) -> TableState {
    let script = PageScript::table_snapshot(cfg);
    let matcher = no_results_matcher(cfg);
    let spec = PollSpec::new(cfg.poll_interval(), max_wait).with_settle(cfg.settle_delay());

    let polled = poll_until(spec, || async {
        match read_state(session, &script, &matcher).await {
            Some(state) if state.is_loaded() => Probe::Ready(state),
            Some(state) => Probe::Pending(Some(state)),
            None => Probe::Pending(None),
        }
    })
    .await;

    match polled {
        Polled::Ready(state) => {
            info!("table: loaded ({:?})", state);
            state
        }
        Polled::TimedOut(last) => {
            let state = match last {
                Some(s) if !s.is_loaded() => s,
                _ => TableState::Loading,
            };
            warn!(
                "table: not loaded after {}ms (last seen {:?})",
                max_wait.as_millis(),
                state
            );
            state
        }
    }
}
