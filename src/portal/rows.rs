//! Row extraction: table body HTML → `NotificationRecord`s.

use super::bridge::safe_evaluate;
use super::scripts::PageScript;
use crate::browser::BrowserSession;
use crate::core::config::PortalConfig;
use crate::core::error::{PortalError, PortalResult};
use crate::core::types::NotificationRecord;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TableHtml {
    html: Option<String>,
}

fn selector(css: &str) -> PortalResult<Selector> {
    Selector::parse(css)
        .map_err(|e| PortalError::StructuralMismatch(format!("bad selector {:?}: {}", css, e)))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the HTML of the table body into records tagged with `page_number`.
///
/// Rows with fewer than `thresholds.min_cells` cells and the empty-message row
/// are skipped; rows carrying neither a secondary key nor a case number are
/// dropped.
pub fn parse_rows(
    html: &str,
    cfg: &PortalConfig,
    page_number: u32,
) -> PortalResult<Vec<NotificationRecord>> {
    let doc = Html::parse_fragment(&format!("<table>{}</table>", html));
    let data_row = selector(&cfg.selectors.data_row)?;
    let any_row = selector("tr")?;
    let empty_row = selector(&cfg.selectors.empty_row)?;
    let actionable = selector(&cfg.selectors.actionable)?;

    let mut rows: Vec<ElementRef> = doc.select(&data_row).collect();
    if rows.is_empty() {
        rows = doc.select(&any_row).collect();
    }

    let cols = &cfg.columns;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in rows {
        if empty_row.matches(&row) {
            continue;
        }
        let cells: Vec<ElementRef> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| c.value().name() == "td")
            .collect();
        if cells.len() < cfg.thresholds.min_cells {
            skipped += 1;
            continue;
        }

        let text_at = |idx: usize| cells.get(idx).map(cell_text).unwrap_or_default();
        let has_attachment_button = cells
            .last()
            .map(|last| last.select(&actionable).next().is_some())
            .unwrap_or(false);

        let record = NotificationRecord {
            row_key: row.value().attr("data-ri").map(str::to_string),
            secondary_key: text_at(cols.secondary_key),
            case_number: text_at(cols.case_number),
            summary: text_at(cols.summary),
            court: text_at(cols.court),
            timestamp: text_at(cols.timestamp),
            has_attachment_button,
            page_number,
            ..Default::default()
        };

        if record.is_identifiable() {
            records.push(record);
        } else {
            skipped += 1;
        }
    }

    if skipped > 0 {
        debug!("rows: skipped {} incomplete row(s) on page {}", skipped, page_number);
    }
    Ok(records)
}

/// Read every visible row of the current page. Never fails: structural
/// problems are logged and yield an empty list.
pub async fn extract_visible_rows(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    page_number: u32,
) -> Vec<NotificationRecord> {
    let Some(TableHtml { html: Some(html) }) =
        safe_evaluate::<TableHtml>(session, &PageScript::table_html(cfg)).await
    else {
        warn!("rows: table body not readable on page {}", page_number);
        return Vec::new();
    };

    match parse_rows(&html, cfg, page_number) {
        Ok(records) => {
            info!("rows: {} record(s) on page {}", records.len(), page_number);
            records
        }
        Err(e) => {
            warn!("rows: extraction failed on page {}: {}", page_number, e);
            Vec::new()
        }
    }
}
