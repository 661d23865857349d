use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// PortalConfig: file-based config loader (notice-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "NOTICE_SCOUT_CONFIG";
pub const ENV_INBOX_URL: &str = "NOTICE_SCOUT_INBOX_URL";
pub const ENV_OUTPUT_DIR: &str = "NOTICE_SCOUT_OUTPUT_DIR";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Per-operation time budgets (milliseconds).
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Ceiling for one `await_table_loaded` call. Default: 30 000.
    pub table_load_ms: u64,
    /// How long a freshly clicked attachment trigger has to produce a dialog. Default: 15 000.
    pub modal_open_ms: u64,
    /// Table wait used after a reload / re-navigation during recovery. Default: 45 000.
    pub recovery_ms: u64,
    /// Ceiling for the intercepted PDF response. Default: 60 000.
    pub pdf_capture_ms: u64,
    /// Binary only: how long the operator has to log in. Default: 600 000.
    pub operator_login_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            table_load_ms: 30_000,
            modal_open_ms: 15_000,
            recovery_ms: 45_000,
            pdf_capture_ms: 60_000,
            operator_login_ms: 600_000,
        }
    }
}

/// Poll intervals and settle delays (milliseconds).
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    /// Anti-flicker delay between the two reads that confirm a loaded table.
    pub settle_ms: u64,
    /// Pause after a dialog closes before the table is trusted again.
    pub post_close_settle_ms: u64,
    /// How long `close()` watches for the dialog to disappear after each strategy.
    pub close_verify_ms: u64,
    /// Base delay between synthetic key presses (jittered).
    pub key_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            settle_ms: 800,
            post_close_settle_ms: 1_500,
            close_verify_ms: 3_000,
            key_delay_ms: 40,
        }
    }
}

/// Retry / escalation knobs. The defaults are empirically tuned against one portal;
/// treat them as starting points, not law.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Consecutive item failures that trigger a health check. Default: 2.
    pub failure_streak: u32,
    /// Recovery attempts allowed per run. Default: 2.
    pub max_recoveries: u32,
    /// Hard stop for pagination, whatever the paginator claims. Default: 50.
    pub max_pages: u32,
    /// Rows with fewer cells are treated as partially rendered. Default: 5.
    pub min_cells: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            failure_streak: 2,
            max_recoveries: 2,
            max_pages: 50,
            min_cells: 5,
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DateFilterConfig {
    /// Default range start = today - `days_back`.
    pub days_back: i64,
    /// chrono format string for the date inputs.
    pub format: String,
}

impl Default for DateFilterConfig {
    fn default() -> Self {
        Self {
            days_back: 7,
            format: "%d/%m/%Y".to_string(),
        }
    }
}

/// CSS selectors / id fragments for the target UI. Defaults follow PrimeFaces markup.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SelectorConfig {
    /// Id (or id suffix) of the notification datatable.
    pub table_id: String,
    pub table_body: String,
    pub data_row: String,
    pub empty_row: String,
    /// Spinners and blocking overlays; any match with non-zero opacity means "loading".
    pub loading_indicators: Vec<String>,
    pub paginator_current: String,
    pub paginator_next: String,
    pub paginator_prev: String,
    pub paginator_page: String,
    pub disabled_class: String,
    pub dialog: String,
    pub dialog_title: String,
    pub dialog_close_icon: String,
    pub dialog_footer_buttons: String,
    pub date_from: String,
    pub date_to: String,
    pub date_popup: String,
    pub search_button_id: String,
    pub download_all_id: String,
    pub attachment_icon: String,
    /// Substring of the generated ids carried by the attachment trigger.
    pub attachment_id_fragment: String,
    pub actionable: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            table_id: "tblLista".to_string(),
            table_body: "tbody.ui-datatable-data".to_string(),
            data_row: "tr[data-ri]".to_string(),
            empty_row: "tr.ui-datatable-empty-message".to_string(),
            loading_indicators: vec![
                ".ui-blockui".to_string(),
                ".ui-blockui-content".to_string(),
                ".ui-datatable-loading".to_string(),
                ".ui-icon-loading".to_string(),
                ".ui-overlay-visible.ui-widget-overlay".to_string(),
            ],
            paginator_current: ".ui-paginator-current".to_string(),
            paginator_next: ".ui-paginator-next".to_string(),
            paginator_prev: ".ui-paginator-prev".to_string(),
            paginator_page: ".ui-paginator-page".to_string(),
            disabled_class: "ui-state-disabled".to_string(),
            dialog: ".ui-dialog".to_string(),
            dialog_title: ".ui-dialog-title".to_string(),
            dialog_close_icon: ".ui-dialog-titlebar-close".to_string(),
            dialog_footer_buttons: ".ui-dialog-footer button, .ui-dialog-buttonpane button".to_string(),
            date_from: "input[id$='fechaInicial_input']".to_string(),
            date_to: "input[id$='fechaFinal_input']".to_string(),
            date_popup: "#ui-datepicker-div".to_string(),
            search_button_id: "btnBuscar".to_string(),
            download_all_id: "btnDescargaTodo".to_string(),
            attachment_icon: ".fa-paperclip, .ui-icon-paperclip, .pi-paperclip".to_string(),
            attachment_id_fragment: "btnAnexo".to_string(),
            actionable: "a, button, [onclick], [role='button']".to_string(),
        }
    }
}

/// Zero-based column positions in a data row. The attachment trigger lives in the last cell.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ColumnConfig {
    pub secondary_key: usize,
    pub case_number: usize,
    pub summary: usize,
    pub court: usize,
    pub timestamp: usize,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            secondary_key: 1,
            case_number: 2,
            summary: 3,
            court: 4,
            timestamp: 5,
        }
    }
}

/// Case-insensitive phrase lists used by the keyword matchers.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct KeywordConfig {
    pub no_results: Vec<String>,
    /// Dialog titles that mark an error/confirmation popup rather than the attachments dialog.
    pub error_dialog_titles: Vec<String>,
    pub close_labels: Vec<String>,
    pub confirm_labels: Vec<String>,
    pub search_labels: Vec<String>,
    pub download_labels: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            no_results: owned(&[
                "no se encontraron",
                "no hay registros",
                "sin resultados",
                "no records found",
                "no results",
            ]),
            error_dialog_titles: owned(&[
                "error",
                "aviso",
                "advertencia",
                "alerta",
                "confirm",
                "mensaje",
                "warning",
                "sesión",
                "session",
            ]),
            close_labels: owned(&["cerrar", "close", "salir", "cancelar", "cancel"]),
            confirm_labels: owned(&["aceptar", "ok", "continuar", "cerrar", "close"]),
            search_labels: owned(&["buscar", "search", "consultar", "filtrar"]),
            download_labels: owned(&[
                "descargar todo",
                "descargar consolidado",
                "download all",
                "consolidado",
            ]),
        }
    }
}

/// Top-level config loaded from `notice-scout.json`.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PortalConfig {
    /// Absolute URL of the notification inbox page.
    pub inbox_url: String,
    /// URL fragments that identify the login / auth pages.
    pub login_url_markers: Vec<String>,
    /// Where the binary writes captured PDFs and the run report.
    pub output_dir: Option<String>,
    pub timeouts: TimeoutConfig,
    pub polling: PollingConfig,
    pub thresholds: ThresholdConfig,
    pub date_filter: DateFilterConfig,
    pub selectors: SelectorConfig,
    pub columns: ColumnConfig,
    pub keywords: KeywordConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            inbox_url: String::new(),
            login_url_markers: vec![
                "login".to_string(),
                "auth".to_string(),
                "sso".to_string(),
                "sesion-expirada".to_string(),
            ],
            output_dir: None,
            timeouts: TimeoutConfig::default(),
            polling: PollingConfig::default(),
            thresholds: ThresholdConfig::default(),
            date_filter: DateFilterConfig::default(),
            selectors: SelectorConfig::default(),
            columns: ColumnConfig::default(),
            keywords: KeywordConfig::default(),
        }
    }
}

impl PortalConfig {
    pub fn with_inbox_url(mut self, url: impl Into<String>) -> Self {
        self.inbox_url = url.into();
        self
    }

    pub fn table_load_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.table_load_ms)
    }

    pub fn modal_open_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.modal_open_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.recovery_ms)
    }

    pub fn pdf_capture_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.pdf_capture_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.polling.settle_ms)
    }

    pub fn post_close_settle(&self) -> Duration {
        Duration::from_millis(self.polling.post_close_settle_ms)
    }

    /// Output directory: env `NOTICE_SCOUT_OUTPUT_DIR` → JSON field → `~/.notice-scout/output`.
    pub fn resolve_output_dir(&self) -> Option<PathBuf> {
        if let Ok(v) = std::env::var(ENV_OUTPUT_DIR) {
            if !v.trim().is_empty() {
                return Some(PathBuf::from(v.trim()));
            }
        }
        if let Some(dir) = &self.output_dir {
            if !dir.trim().is_empty() {
                return Some(PathBuf::from(dir.trim()));
            }
        }
        dirs::home_dir().map(|h| h.join(".notice-scout").join("output"))
    }

    /// Env overrides that win over the file value.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(ENV_INBOX_URL) {
            let v = v.trim();
            if !v.is_empty() {
                self.inbox_url = v.to_string();
            }
        }
    }
}

/// Load `notice-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `NOTICE_SCOUT_CONFIG` env var path
/// 2. `./notice-scout.json`
/// 3. `../notice-scout.json`
///
/// Missing file → `PortalConfig::default()` (silent).
/// Parse error → log a warning, return defaults.
/// Env overrides are applied in both cases.
pub fn load_portal_config() -> PortalConfig {
    let mut candidates = vec![
        PathBuf::from("notice-scout.json"),
        PathBuf::from("../notice-scout.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    let mut cfg = PortalConfig::default();
    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        match serde_json::from_str::<PortalConfig>(&contents) {
            Ok(parsed) => {
                tracing::info!("notice-scout.json loaded from {}", path.display());
                cfg = parsed;
            }
            Err(e) => {
                tracing::warn!(
                    "notice-scout.json parse error at {}: {}, using defaults",
                    path.display(),
                    e
                );
            }
        }
        break;
    }

    cfg.apply_env_overrides();
    cfg
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if std::path::Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}
