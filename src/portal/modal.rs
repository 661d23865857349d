//! Attachments dialog: open for a row, confirm it rendered, close it.

use super::bridge::safe_evaluate;
use super::matchers::KeywordMatcher;
use super::poll::wait_for;
use super::scripts::{CloseMethod, LocatorScope, PageScript, StrategySpec};
use crate::browser::{BrowserSession, Key, SessionError};
use crate::core::config::PortalConfig;
use crate::core::error::{PortalError, PortalResult};
use crate::core::types::{KeyColumn, NotificationRecord};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Row lookups that come back unreadable are retried this many times.
const TRIGGER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Closed,
    Opening,
    Open,
    Closing,
    Error,
}

/// Ways to find the attachment trigger inside a row, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStrategy {
    IconClass,
    LastCellAction,
    DynamicId,
    AnyAction,
}

impl LocatorStrategy {
    pub const ORDER: [LocatorStrategy; 4] = [
        LocatorStrategy::IconClass,
        LocatorStrategy::LastCellAction,
        LocatorStrategy::DynamicId,
        LocatorStrategy::AnyAction,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::IconClass => "icon_class",
            LocatorStrategy::LastCellAction => "last_cell_action",
            LocatorStrategy::DynamicId => "dynamic_id",
            LocatorStrategy::AnyAction => "any_action",
        }
    }

    pub fn spec(&self, cfg: &PortalConfig) -> StrategySpec {
        let s = &cfg.selectors;
        let (scope, selector) = match self {
            LocatorStrategy::IconClass => (LocatorScope::Row, s.attachment_icon.clone()),
            LocatorStrategy::LastCellAction => (LocatorScope::LastCell, s.actionable.clone()),
            LocatorStrategy::DynamicId => (
                LocatorScope::Row,
                format!("[id*='{}']", s.attachment_id_fragment),
            ),
            LocatorStrategy::AnyAction => (LocatorScope::Row, s.actionable.clone()),
        };
        StrategySpec {
            name: self.name().to_string(),
            scope,
            selector,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TriggerResult {
    #[serde(default)]
    row_found: bool,
    #[serde(default)]
    relocated: bool,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    clicked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialogInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
struct CloseResult {
    #[serde(default)]
    clicked: bool,
}

pub struct ModalController<'a> {
    session: &'a dyn BrowserSession,
    cfg: &'a PortalConfig,
    state: ModalState,
    last_strategy: Option<String>,
    error_titles: KeywordMatcher,
}

impl<'a> ModalController<'a> {
    pub fn new(session: &'a dyn BrowserSession, cfg: &'a PortalConfig) -> Self {
        Self {
            session,
            cfg,
            state: ModalState::Closed,
            last_strategy: None,
            error_titles: KeywordMatcher::new(&cfg.keywords.error_dialog_titles),
        }
    }

    pub fn state(&self) -> ModalState {
        self.state
    }

    /// Locator strategy that found the trigger on the last successful open.
    pub fn last_strategy(&self) -> Option<&str> {
        self.last_strategy.as_deref()
    }

    fn transition(&mut self, next: ModalState) {
        if self.state != next {
            debug!("modal: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn fail(&mut self, err: PortalError) -> PortalError {
        self.transition(ModalState::Error);
        warn!("modal: {}", err);
        err
    }

    async fn dialogs(&self) -> Option<Vec<DialogInfo>> {
        safe_evaluate::<Vec<DialogInfo>>(self.session, &PageScript::dialog_probe(self.cfg)).await
    }

    fn is_error_dialog(&self, d: &DialogInfo) -> bool {
        self.error_titles.is_match(&d.title)
    }

    async fn genuine_dialog_visible(&self) -> bool {
        self.dialogs()
            .await
            .map(|ds| ds.iter().any(|d| d.visible && !self.is_error_dialog(d)))
            .unwrap_or(false)
    }

    /// `None` counts as closed: nothing readable is on screen.
    async fn any_dialog_visible(&self) -> bool {
        self.dialogs()
            .await
            .map(|ds| ds.iter().any(|d| d.visible))
            .unwrap_or(false)
    }

    /// Open the attachments dialog of the row identified by `secondary_key`,
    /// using `row_key` only as a hint.
    pub async fn open(&mut self, row_key: Option<&str>, secondary_key: &str) -> PortalResult<()> {
        self.open_row(row_key, KeyColumn::SecondaryKey, secondary_key).await
    }

    /// Open the attachments dialog of `record`, found by its identity
    /// (secondary key, else case number).
    pub async fn open_record(&mut self, record: &NotificationRecord) -> PortalResult<()> {
        match record.identity() {
            Some((column, key)) => self.open_row(record.row_key.as_deref(), column, key).await,
            None => {
                self.transition(ModalState::Opening);
                Err(self.fail(PortalError::NotFound("row without any key".into())))
            }
        }
    }

    async fn open_row(
        &mut self,
        row_key: Option<&str>,
        column: KeyColumn,
        key: &str,
    ) -> PortalResult<()> {
        let key = key.trim();
        if key.is_empty() {
            self.transition(ModalState::Opening);
            return Err(self.fail(PortalError::NotFound("row without any key".into())));
        }

        // A dialog left over from an earlier row would pass for this one.
        if self.genuine_dialog_visible().await {
            warn!("modal: a dialog is still open before opening {}, closing it", key);
            if !self.close().await {
                self.transition(ModalState::Opening);
                return Err(self.fail(PortalError::Timeout(format!(
                    "previous dialog still open, {} not attempted",
                    key
                ))));
            }
        }
        self.transition(ModalState::Opening);

        let strategies = LocatorStrategy::ORDER
            .iter()
            .map(|s| s.spec(self.cfg))
            .collect::<Vec<_>>();
        let script =
            PageScript::click_attachment_trigger(self.cfg, row_key, column, key, strategies);

        let mut result = None;
        for attempt in 1..=TRIGGER_ATTEMPTS {
            if let Some(r) = safe_evaluate::<TriggerResult>(self.session, &script).await {
                result = Some(r);
                break;
            }
            debug!("modal: trigger lookup unreadable (attempt {})", attempt);
            tokio::time::sleep(self.cfg.poll_interval()).await;
        }

        let Some(trigger) = result else {
            return Err(self.fail(PortalError::ContextLost));
        };
        if !trigger.row_found {
            return Err(self.fail(PortalError::NotFound(format!(
                "row {} not in table",
                key
            ))));
        }
        if !trigger.clicked {
            return Err(self.fail(PortalError::NotFound(format!(
                "attachment trigger missing in row {}",
                key
            ))));
        }
        if trigger.relocated {
            debug!("modal: row {} re-located by {:?}", key, column);
        }
        self.last_strategy = trigger.strategy;

        let this = &*self;
        let opened = wait_for(
            this.cfg.poll_interval(),
            this.cfg.modal_open_timeout(),
            || this.genuine_dialog_visible(),
        )
        .await;

        if opened {
            self.transition(ModalState::Open);
            info!(
                "modal: opened for {} via {}",
                key,
                self.last_strategy.as_deref().unwrap_or("?")
            );
            return Ok(());
        }

        let error_title = self.dialogs().await.and_then(|ds| {
            ds.into_iter()
                .find(|d| d.visible && self.is_error_dialog(d))
                .map(|d| d.title)
        });
        let err = match error_title {
            Some(title) => PortalError::Timeout(format!(
                "error dialog \"{}\" shown instead of attachments for {}",
                title, key
            )),
            None => PortalError::Timeout(format!(
                "attachments dialog did not appear for {}",
                key
            )),
        };
        Err(self.fail(err))
    }

    async fn wait_closed(&self, within: Duration) -> bool {
        let session = self.session;
        wait_for(self.cfg.poll_interval(), within, || async {
            session.is_closed() || !self.any_dialog_visible().await
        })
        .await
    }

    /// Close every visible dialog. Idempotent: true when nothing is open or
    /// the session is already gone.
    pub async fn close(&mut self) -> bool {
        if self.session.is_closed() {
            self.transition(ModalState::Closed);
            return true;
        }
        if !self.any_dialog_visible().await {
            self.transition(ModalState::Closed);
            return true;
        }

        self.transition(ModalState::Closing);
        let verify = Duration::from_millis(self.cfg.polling.close_verify_ms);

        for method in [CloseMethod::CloseIcon, CloseMethod::FooterButton] {
            let clicked = safe_evaluate::<CloseResult>(
                self.session,
                &PageScript::close_dialog(self.cfg, method),
            )
            .await
            .map(|r| r.clicked)
            .unwrap_or(false);
            if clicked && self.wait_closed(verify).await {
                debug!("modal: closed via {:?}", method);
                self.transition(ModalState::Closed);
                return true;
            }
        }

        match self.session.press_key(Key::Escape).await {
            Err(SessionError::Closed) => {
                self.transition(ModalState::Closed);
                return true;
            }
            Err(e) => debug!("modal: escape failed: {}", e),
            Ok(()) => {}
        }
        if self.wait_closed(verify).await {
            debug!("modal: closed via escape");
            self.transition(ModalState::Closed);
            return true;
        }

        self.transition(ModalState::Error);
        warn!("modal: dialog still visible after every close strategy");
        false
    }
}
