//! Full notification list: optional date filter, then every page in order.

use super::date_filter::{apply_date_filter, DateRange};
use super::pagination::{go_to_next_page, has_next_page};
use super::rows::extract_visible_rows;
use super::table::{await_table_loaded, peek_table_state};
use crate::browser::BrowserSession;
use crate::core::config::PortalConfig;
use crate::core::error::{PortalError, PortalResult};
use crate::core::types::{KeyColumn, NotificationRecord, TableState};
use std::collections::HashSet;
use tracing::{info, warn};

/// Dedup key: the secondary key, or the case number for rows without one.
fn identity(record: &NotificationRecord) -> String {
    match record.identity() {
        Some((KeyColumn::SecondaryKey, key)) => key.to_string(),
        Some((KeyColumn::CaseNumber, case)) => format!("case:{}", case),
        None => String::new(),
    }
}

/// Collect every notification currently reachable in the inbox.
///
/// When the table already shows rows the date filter is skipped entirely; a
/// filter that cannot be applied leaves the table as it is. Pagination stops
/// on the last page, at `thresholds.max_pages`, or when a page yields only
/// records already seen.
pub async fn collect_notifications(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    range: Option<DateRange>,
) -> PortalResult<Vec<NotificationRecord>> {
    match peek_table_state(session, cfg).await {
        Some(TableState::LoadedWithRows(n)) => {
            info!("collector: table already shows {} row(s), skipping date filter", n);
        }
        other => {
            info!("collector: table is {:?}, applying date filter", other);
            if !apply_date_filter(session, cfg, range).await {
                warn!("collector: date filter not applied, using the table as-is");
            }
        }
    }

    let state = await_table_loaded(session, cfg, cfg.table_load_timeout()).await;
    match state {
        TableState::LoadedEmpty => {
            info!("collector: inbox is empty");
            return Ok(Vec::new());
        }
        TableState::LoadedWithRows(_) => {}
        TableState::Loading | TableState::Absent => {
            return Err(PortalError::Timeout(format!(
                "notification table never loaded ({:?})",
                state
            )));
        }
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut page = 1u32;

    loop {
        let rows = extract_visible_rows(session, cfg, page).await;
        let before = records.len();
        for row in rows {
            if seen.insert(identity(&row)) {
                records.push(row);
            }
        }
        let added = records.len() - before;
        info!("collector: page {} added {} record(s)", page, added);

        if added == 0 && page > 1 {
            warn!("collector: page {} repeated earlier rows, stopping", page);
            break;
        }
        if page >= cfg.thresholds.max_pages {
            warn!("collector: reached page limit {}", cfg.thresholds.max_pages);
            break;
        }
        if !has_next_page(session, cfg).await {
            break;
        }
        if !go_to_next_page(session, cfg).await {
            warn!("collector: could not advance past page {}", page);
            break;
        }
        page += 1;
    }

    info!("collector: {} notification(s) over {} page(s)", records.len(), page);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_secondary_key() {
        let a = NotificationRecord {
            secondary_key: " N-1 ".into(),
            case_number: "C".into(),
            ..Default::default()
        };
        let b = NotificationRecord {
            case_number: "C".into(),
            ..Default::default()
        };
        assert_eq!(identity(&a), "N-1");
        assert_eq!(identity(&b), "case:C");
    }
}
