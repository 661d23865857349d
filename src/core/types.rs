use serde::{Deserialize, Serialize};

fn default_page() -> u32 {
    1
}

/// One row of the notification inbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Server-assigned row index (`data-ri`). Reassigned on every AJAX rebuild,
    /// so it is only ever used as a fast-path hint.
    #[serde(default)]
    pub row_key: Option<String>,
    /// Human-readable notification number. Stable across reloads.
    #[serde(default)]
    pub secondary_key: String,
    #[serde(default)]
    pub case_number: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub court: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub has_attachment_button: bool,
    #[serde(default = "default_page")]
    pub page_number: u32,
    /// Base64 payload of the consolidated PDF, set after a successful capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_pdf: Option<String>,
    #[serde(default)]
    pub attachment_filename: Option<String>,
    /// True only when PDF bytes were actually captured.
    #[serde(default)]
    pub downloaded: bool,
}

impl NotificationRecord {
    /// Records lacking both identifiers cannot be re-located and are dropped at extraction.
    pub fn is_identifiable(&self) -> bool {
        !self.secondary_key.trim().is_empty() || !self.case_number.trim().is_empty()
    }

    /// Stable identity used to find the row again after a rebuild: the
    /// secondary key, else the case number.
    pub fn identity(&self) -> Option<(KeyColumn, &str)> {
        let key = self.secondary_key.trim();
        if !key.is_empty() {
            return Some((KeyColumn::SecondaryKey, key));
        }
        let case = self.case_number.trim();
        (!case.is_empty()).then_some((KeyColumn::CaseNumber, case))
    }

    /// Short label for logs and outcome details.
    pub fn label(&self) -> String {
        match (self.secondary_key.is_empty(), self.case_number.is_empty()) {
            (false, false) => format!("{} ({})", self.secondary_key, self.case_number),
            (false, true) => self.secondary_key.clone(),
            (true, false) => self.case_number.clone(),
            (true, true) => "<unidentified>".to_string(),
        }
    }
}

/// Column a row identity is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyColumn {
    SecondaryKey,
    CaseNumber,
}

/// Observed state of the notification table. Always re-derived from the live DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableState {
    Loading,
    Absent,
    LoadedEmpty,
    LoadedWithRows(usize),
}

impl TableState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, TableState::LoadedEmpty | TableState::LoadedWithRows(_))
    }

    pub fn row_count(&self) -> usize {
        match self {
            TableState::LoadedWithRows(n) => *n,
            _ => 0,
        }
    }
}

/// Liveness snapshot taken right before deciding on recovery. Never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionHealth {
    pub alive: bool,
    pub on_expected_page: bool,
    pub context_responsive: bool,
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SessionHealth {
    pub fn dead() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self) -> bool {
        self.alive && self.context_responsive && self.on_expected_page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetail {
    pub index: usize,
    pub row_key: Option<String>,
    pub secondary_key: String,
    pub case_number: String,
    pub status: ItemStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemDetail {
    pub fn new(index: usize, record: &NotificationRecord, status: ItemStatus) -> Self {
        Self {
            index,
            row_key: record.row_key.clone(),
            secondary_key: record.secondary_key.clone(),
            case_number: record.case_number.clone(),
            status,
            success: status != ItemStatus::Failed,
            error: None,
        }
    }

    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.error = Some(reason.into());
        self
    }
}

/// Aggregate result of one processing run.
///
/// Counters only move through [`ProcessingOutcome::record`], which keeps them in
/// lock-step with `details`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub run_id: String,
    pub succeeded: usize,
    pub partially_succeeded: usize,
    pub failed: usize,
    pub recoveries: usize,
    pub details: Vec<ItemDetail>,
}

impl ProcessingOutcome {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            succeeded: 0,
            partially_succeeded: 0,
            failed: 0,
            recoveries: 0,
            details: Vec::new(),
        }
    }

    pub fn record(&mut self, detail: ItemDetail) {
        match detail.status {
            ItemStatus::Succeeded => self.succeeded += 1,
            ItemStatus::PartiallySucceeded => self.partially_succeeded += 1,
            ItemStatus::Failed => self.failed += 1,
        }
        self.details.push(detail);
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.partially_succeeded + self.failed
    }

    pub fn is_consistent(&self) -> bool {
        self.total() == self.details.len()
    }
}

impl Default for ProcessingOutcome {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, case: &str) -> NotificationRecord {
        NotificationRecord {
            secondary_key: key.to_string(),
            case_number: case.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_identifiable_needs_one_key() {
        assert!(record("N-1", "").is_identifiable());
        assert!(record("", "00123-2024").is_identifiable());
        assert!(!record("  ", "").is_identifiable());
    }

    #[test]
    fn test_identity_falls_back_to_case_number() {
        assert_eq!(
            record(" N-1 ", "C-9").identity(),
            Some((KeyColumn::SecondaryKey, "N-1"))
        );
        assert_eq!(
            record("", " C-9 ").identity(),
            Some((KeyColumn::CaseNumber, "C-9"))
        );
        assert_eq!(record(" ", "").identity(), None);
    }

    #[test]
    fn test_record_deserializes_with_default_page() {
        let rec: NotificationRecord =
            serde_json::from_str(r#"{"secondary_key":"4711","case_number":"C-9"}"#).unwrap();
        assert_eq!(rec.page_number, 1);
        assert!(!rec.downloaded);
        assert!(rec.attachment_pdf.is_none());
    }

    #[test]
    fn test_outcome_counters_track_details() {
        let mut outcome = ProcessingOutcome::new();
        let rec = record("A", "1");
        outcome.record(ItemDetail::new(0, &rec, ItemStatus::Succeeded));
        outcome.record(ItemDetail::new(1, &rec, ItemStatus::PartiallySucceeded));
        outcome.record(ItemDetail::new(2, &rec, ItemStatus::Failed).with_error("modal timeout"));

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.partially_succeeded, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.is_consistent());
        assert!(outcome.details[1].success);
        assert!(!outcome.details[2].success);
    }

    #[test]
    fn test_table_state_accessors() {
        assert!(TableState::LoadedEmpty.is_loaded());
        assert_eq!(TableState::LoadedWithRows(7).row_count(), 7);
        assert!(!TableState::Loading.is_loaded());
        assert_eq!(TableState::Absent.row_count(), 0);
    }
}
