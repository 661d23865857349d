//! Per-notification processing loop with failure escalation.
//!
//! Items are processed strictly in input order. Consecutive failures escalate
//! to a health check and, if the session is unhealthy, to recovery; an
//! exhausted recovery budget or an expired session ends the run, and every
//! remaining item is still accounted for.

use super::download::{capture_consolidated_pdf, DownloadOutcome};
use super::health::check_health;
use super::modal::ModalController;
use super::pagination::{current_page, go_to_page};
use super::recovery::recover;
use super::table::await_table_loaded;
use crate::browser::BrowserSession;
use crate::core::config::PortalConfig;
use crate::core::types::{ItemDetail, ItemStatus, NotificationRecord, ProcessingOutcome};
use tracing::{error, info, warn};

pub const REASON_UNRECOVERABLE: &str = "page unrecoverable";
pub const REASON_SESSION_EXPIRED: &str = "session expired";
pub const REASON_NO_ATTACHMENT: &str = "row has no attachment control";

/// Counters threaded through one run.
#[derive(Debug, Clone, Copy)]
struct RunState {
    failure_streak: u32,
    recoveries_used: u32,
    /// `None` when the paginator gives no indicator; every item then navigates.
    current_page: Option<u32>,
}

impl RunState {
    fn new() -> Self {
        Self {
            failure_streak: 0,
            recoveries_used: 0,
            current_page: None,
        }
    }
}

enum Escalation {
    Continue,
    Abort(String),
}

pub struct NotificationProcessor<'a> {
    session: &'a dyn BrowserSession,
    cfg: &'a PortalConfig,
}

impl<'a> NotificationProcessor<'a> {
    pub fn new(session: &'a dyn BrowserSession, cfg: &'a PortalConfig) -> Self {
        Self { session, cfg }
    }

    fn streak_threshold(&self) -> u32 {
        self.cfg.thresholds.failure_streak.max(1)
    }

    /// Process every record, writing captured PDFs into the records themselves.
    /// Always returns a complete outcome with one detail per record.
    pub async fn run(&self, records: &mut [NotificationRecord]) -> ProcessingOutcome {
        let mut outcome = ProcessingOutcome::new();
        let mut state = RunState::new();
        // Collection usually leaves the table on its last page.
        state.current_page = current_page(self.session, self.cfg).await;
        let mut modal = ModalController::new(self.session, self.cfg);
        info!(
            "processor: run {} over {} notification(s)",
            outcome.run_id,
            records.len()
        );

        for index in 0..records.len() {
            if state.failure_streak >= self.streak_threshold() {
                if let Escalation::Abort(reason) = self.escalate(&mut state, &mut outcome).await {
                    error!(
                        "processor: aborting with {} item(s) left: {}",
                        records.len() - index,
                        reason
                    );
                    for (i, record) in records.iter().enumerate().skip(index) {
                        outcome.record(
                            ItemDetail::new(i, record, ItemStatus::Failed).with_error(reason.clone()),
                        );
                    }
                    break;
                }
            }

            let detail = self
                .process_item(index, &mut records[index], &mut state, &mut modal)
                .await;
            outcome.record(detail);
        }

        info!(
            "processor: run {} done: {} ok, {} partial, {} failed, {} recovery attempt(s)",
            outcome.run_id,
            outcome.succeeded,
            outcome.partially_succeeded,
            outcome.failed,
            outcome.recoveries
        );
        outcome
    }

    async fn escalate(&self, state: &mut RunState, outcome: &mut ProcessingOutcome) -> Escalation {
        let health = check_health(self.session, self.cfg).await;
        if health.is_healthy() {
            info!("processor: {} failures in a row but session is healthy", state.failure_streak);
            state.failure_streak = 0;
            return Escalation::Continue;
        }
        warn!("processor: session unhealthy ({:?}), recovering", health);

        loop {
            if state.recoveries_used >= self.cfg.thresholds.max_recoveries {
                return Escalation::Abort(REASON_UNRECOVERABLE.to_string());
            }
            state.recoveries_used += 1;
            outcome.recoveries += 1;

            match recover(self.session, self.cfg).await {
                Err(e) if e.is_fatal() => {
                    warn!("processor: {}", e);
                    return Escalation::Abort(REASON_SESSION_EXPIRED.to_string());
                }
                Err(e) => warn!("processor: recovery error: {}", e),
                Ok(report) if report.recovered => {
                    state.failure_streak = 0;
                    state.current_page = current_page(self.session, self.cfg).await;
                    return Escalation::Continue;
                }
                Ok(_) => {}
            }
            warn!(
                "processor: recovery attempt {}/{} failed",
                state.recoveries_used, self.cfg.thresholds.max_recoveries
            );
        }
    }

    async fn process_item(
        &self,
        index: usize,
        record: &mut NotificationRecord,
        state: &mut RunState,
        modal: &mut ModalController<'_>,
    ) -> ItemDetail {
        let label = record.label();
        let target_page = record.page_number.max(1);

        if state.current_page != Some(target_page) {
            if go_to_page(self.session, self.cfg, target_page).await {
                state.current_page = Some(target_page);
            } else {
                state.current_page = current_page(self.session, self.cfg).await;
                state.failure_streak += 1;
                warn!("processor: [{}] {} could not reach page {}", index, label, target_page);
                return ItemDetail::new(index, record, ItemStatus::Failed)
                    .with_error(format!("could not reach page {}", target_page));
            }
        }

        if !record.has_attachment_button {
            info!("processor: [{}] {} has no attachments, skipped", index, label);
            return ItemDetail::new(index, record, ItemStatus::Failed).with_error(REASON_NO_ATTACHMENT);
        }

        if let Err(e) = modal.open_record(record).await {
            state.failure_streak += 1;
            warn!("processor: [{}] {} open failed: {}", index, label, e);
            modal.close().await;
            tokio::time::sleep(self.cfg.post_close_settle()).await;
            return ItemDetail::new(index, record, ItemStatus::Failed).with_error(e.to_string());
        }

        let fallback_key = record
            .identity()
            .map(|(_, key)| key.to_string())
            .unwrap_or_default();
        let detail = match capture_consolidated_pdf(self.session, self.cfg, &fallback_key).await {
            Ok(DownloadOutcome::Captured(pdf)) => {
                record.attachment_pdf = Some(pdf.base64);
                record.attachment_filename = Some(pdf.filename);
                record.downloaded = true;
                state.failure_streak = 0;
                info!("processor: [{}] {} ✅ {} bytes", index, label, pdf.size);
                ItemDetail::new(index, record, ItemStatus::Succeeded)
            }
            Ok(DownloadOutcome::ClickedWithoutCapture) => {
                state.failure_streak = 0;
                info!("processor: [{}] {} clicked, no bytes captured", index, label);
                ItemDetail::new(index, record, ItemStatus::PartiallySucceeded)
                    .with_error("download clicked but no bytes captured")
            }
            Err(e) => {
                state.failure_streak += 1;
                warn!("processor: [{}] {} download failed: {}", index, label, e);
                ItemDetail::new(index, record, ItemStatus::Failed).with_error(e.to_string())
            }
        };

        self.cleanup(state, modal).await;
        detail
    }

    /// Close the dialog and make sure the table is usable for the next item.
    /// Only ever adjusts the failure streak; the item is already accounted for.
    async fn cleanup(&self, state: &mut RunState, modal: &mut ModalController<'_>) {
        if !modal.close().await {
            warn!("processor: dialog did not close");
        }
        tokio::time::sleep(self.cfg.post_close_settle()).await;

        let threshold = self.streak_threshold();
        let health = check_health(self.session, self.cfg).await;
        if !health.is_healthy() {
            warn!("processor: unhealthy after close, forcing escalation");
            state.failure_streak = state.failure_streak.max(threshold);
            return;
        }

        let timeout = self.cfg.table_load_timeout();
        if await_table_loaded(self.session, self.cfg, timeout).await.is_loaded() {
            return;
        }
        warn!("processor: table not back after close, waiting once more");
        if !await_table_loaded(self.session, self.cfg, timeout).await.is_loaded() {
            state.failure_streak = state.failure_streak.max(threshold);
        }
    }
}

/// Run a [`NotificationProcessor`] over `records`.
pub async fn process_notifications(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    records: &mut [NotificationRecord],
) -> ProcessingOutcome {
    NotificationProcessor::new(session, cfg).run(records).await
}
