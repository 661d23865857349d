//! Catalogue of in-page queries and actions.
//!
//! Every interaction with the inbox DOM is a named `PageScript` with typed
//! arguments. `to_js()` renders it into a self-invoking expression whose
//! argument object is the serialized variant itself, so the JS bodies read
//! their parameters from `a.<field>`.

use crate::core::config::PortalConfig;
use crate::core::types::KeyColumn;
use serde::Serialize;

/// Where a locator strategy looks inside a table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorScope {
    Row,
    LastCell,
}

/// One entry of an ordered fallback chain used to find a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategySpec {
    pub name: String,
    pub scope: LocatorScope,
    pub selector: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginatorTarget {
    Next,
    Prev,
    Page(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseMethod {
    CloseIcon,
    FooterButton,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageScript {
    /// Loading indicators, table presence and data-row count in one read.
    TableSnapshot {
        table_id: String,
        table_body: String,
        empty_row: String,
        loading: Vec<String>,
        min_cells: usize,
    },
    /// `outerHTML` of the table body.
    TableHtml { table_id: String, table_body: String },
    PaginatorState {
        table_id: String,
        current: String,
        next: String,
        disabled_class: String,
    },
    ClickPaginator {
        table_id: String,
        target: PaginatorTarget,
        next: String,
        prev: String,
        page: String,
        disabled_class: String,
    },
    FocusAndSelect { selector: String },
    /// Commit a typed value and hide the date picker it may have opened.
    BlurInput { selector: String, popup: String },
    ClickSearch { button_id: String, labels: Vec<String> },
    /// Find the row whose `key_column` cell equals `key` and click its trigger.
    /// `row_key` is only tried first and must carry the same key.
    ClickAttachmentTrigger {
        table_id: String,
        data_row: String,
        row_key: Option<String>,
        key: String,
        key_column: usize,
        actionable: String,
        strategies: Vec<StrategySpec>,
    },
    DialogProbe { dialog: String, title: String },
    CloseDialog {
        method: CloseMethod,
        dialog: String,
        close_icon: String,
        footer_buttons: String,
        labels: Vec<String>,
    },
    /// Locate (and optionally click) the "download all" control of the open dialog.
    DownloadAll {
        dialog: String,
        button_id: String,
        labels: Vec<String>,
        actionable: String,
        click: bool,
    },
    HealthProbe { table_id: String, data_row: String },
    /// Click the confirm/close control of visible dialogs. Never looks outside dialog containers.
    DismissOverlayDialogs {
        dialog: String,
        footer_buttons: String,
        close_icon: String,
        labels: Vec<String>,
    },
}

const PRELUDE: &str = r#"
const findTable = (id) => document.getElementById(id) || document.querySelector('[id$="' + id + '"]');
const isVisible = (el) => {
    if (!el) return false;
    const st = window.getComputedStyle(el);
    if (st.display === 'none' || st.visibility === 'hidden' || parseFloat(st.opacity || '1') === 0) return false;
    return el.getClientRects().length > 0;
};
const txt = (el) => ((el && (el.innerText || el.value || el.title || el.textContent)) || '').trim().toLowerCase();
const cellsOf = (row) => Array.from(row.children).filter(c => c.tagName === 'TD');
"#;

const TABLE_SNAPSHOT_JS: &str = r#"
const loading = a.loading.some(sel => Array.from(document.querySelectorAll(sel)).some(isVisible));
const table = findTable(a.table_id);
const body = table ? (table.querySelector(a.table_body) || table.querySelector('tbody')) : null;
if (!body) return { loading, table_present: false, row_count: 0, empty_row: false, text: null };
const rows = Array.from(body.children).filter(r => r.tagName === 'TR');
const emptyRow = rows.some(r => r.matches(a.empty_row));
const rowCount = rows.filter(r => !r.matches(a.empty_row) && cellsOf(r).length >= a.min_cells).length;
const text = rowCount === 0 ? (body.innerText || body.textContent || '').trim().slice(0, 500) : null;
return { loading, table_present: true, row_count: rowCount, empty_row: emptyRow, text };
"#;

const TABLE_HTML_JS: &str = r#"
const table = findTable(a.table_id);
const body = table ? (table.querySelector(a.table_body) || table.querySelector('tbody')) : null;
return { html: body ? body.outerHTML : null };
"#;

const PAGINATOR_STATE_JS: &str = r#"
const table = findTable(a.table_id);
const scope = (table && (table.closest('.ui-datatable') || table)) || document;
const cur = scope.querySelector(a.current) || document.querySelector(a.current);
const next = scope.querySelector(a.next) || document.querySelector(a.next);
return {
    text: cur ? (cur.innerText || cur.textContent || '').trim() : null,
    next_present: !!next,
    next_enabled: !!next && !next.classList.contains(a.disabled_class) && next.getAttribute('aria-disabled') !== 'true'
};
"#;

const CLICK_PAGINATOR_JS: &str = r#"
const table = findTable(a.table_id);
const scope = (table && (table.closest('.ui-datatable') || table)) || document;
let el = null;
if (a.target === 'next') el = scope.querySelector(a.next);
else if (a.target === 'prev') el = scope.querySelector(a.prev);
else if (a.target && a.target.page !== undefined) {
    el = Array.from(scope.querySelectorAll(a.page)).find(p => (p.innerText || p.textContent || '').trim() === String(a.target.page)) || null;
}
if (!el || el.classList.contains(a.disabled_class)) return { clicked: false };
el.click();
return { clicked: true };
"#;

const FOCUS_AND_SELECT_JS: &str = r#"
const el = document.querySelector(a.selector);
if (!el) return { found: false };
el.scrollIntoView({ block: 'center' });
el.focus();
if (typeof el.select === 'function') el.select();
return { found: true };
"#;

const BLUR_INPUT_JS: &str = r#"
const el = document.querySelector(a.selector);
if (el) {
    el.dispatchEvent(new Event('change', { bubbles: true }));
    el.blur();
}
const popup = document.querySelector(a.popup);
if (popup) popup.style.display = 'none';
return { found: !!el };
"#;

const CLICK_SEARCH_JS: &str = r#"
let el = document.getElementById(a.button_id) || document.querySelector('[id$="' + a.button_id + '"]');
let via = el ? 'id' : null;
if (!el) {
    const labels = a.labels.map(l => l.toLowerCase());
    el = Array.from(document.querySelectorAll('button, a, input[type=submit], input[type=button]'))
        .find(b => isVisible(b) && labels.some(l => txt(b).includes(l))) || null;
    via = el ? 'text' : null;
}
if (!el) return { clicked: false, via: null };
el.click();
return { clicked: true, via };
"#;

const CLICK_ATTACHMENT_TRIGGER_JS: &str = r#"
const none = { row_found: false, relocated: false, strategy: null, clicked: false };
const table = findTable(a.table_id);
if (!table) return none;
const rows = Array.from(table.querySelectorAll(a.data_row));
const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const wanted = norm(a.key);
if (!wanted) return none;
const keyOf = (r) => { const c = cellsOf(r)[a.key_column]; return c ? norm(c.innerText || c.textContent) : ''; };
let row = null;
let relocated = false;
if (a.row_key !== null && a.row_key !== undefined) {
    const hinted = rows.find(r => r.getAttribute('data-ri') === String(a.row_key));
    if (hinted && keyOf(hinted) === wanted) row = hinted;
}
if (!row) {
    row = rows.find(r => keyOf(r) === wanted) || null;
    relocated = !!row;
}
if (!row) return none;
for (const s of a.strategies) {
    let scope = row;
    if (s.scope === 'last_cell') { const cells = cellsOf(row); scope = cells[cells.length - 1] || null; }
    if (!scope) continue;
    const hit = scope.querySelector(s.selector);
    if (!hit) continue;
    const target = hit.closest(a.actionable) || hit;
    target.scrollIntoView({ block: 'center' });
    target.click();
    return { row_found: true, relocated, strategy: s.name, clicked: true };
}
return { row_found: true, relocated, strategy: null, clicked: false };
"#;

const DIALOG_PROBE_JS: &str = r#"
return Array.from(document.querySelectorAll(a.dialog)).map(d => {
    const t = d.querySelector(a.title);
    return { id: d.id || null, title: t ? (t.innerText || t.textContent || '').trim() : '', visible: isVisible(d) };
});
"#;

const CLOSE_DIALOG_JS: &str = r#"
const open = Array.from(document.querySelectorAll(a.dialog)).filter(isVisible);
if (!open.length) return { clicked: false, open: 0 };
const labels = a.labels.map(l => l.toLowerCase());
let clicked = 0;
for (const d of open) {
    let el = null;
    if (a.method === 'close_icon') el = d.querySelector(a.close_icon);
    else el = Array.from(d.querySelectorAll(a.footer_buttons)).find(b => labels.some(l => txt(b).includes(l))) || null;
    if (el) { el.click(); clicked++; }
}
return { clicked: clicked > 0, open: open.length };
"#;

const DOWNLOAD_ALL_JS: &str = r#"
const dialogs = Array.from(document.querySelectorAll(a.dialog)).filter(isVisible);
let el = null;
let via = null;
for (const d of dialogs) {
    el = d.querySelector('[id="' + a.button_id + '"]') || d.querySelector('[id$="' + a.button_id + '"]');
    if (el) { via = 'id'; break; }
}
if (!el) {
    const labels = a.labels.map(l => l.toLowerCase());
    for (const d of dialogs) {
        el = Array.from(d.querySelectorAll(a.actionable)).find(b => labels.some(l => txt(b).includes(l))) || null;
        if (el) { via = 'text'; break; }
    }
}
if (!el) return { found: false, clicked: false, via: null };
if (a.click) el.click();
return { found: true, clicked: !!a.click, via };
"#;

const HEALTH_PROBE_JS: &str = r#"
const table = findTable(a.table_id);
return { has_table: !!table, row_count: table ? table.querySelectorAll(a.data_row).length : 0 };
"#;

const DISMISS_OVERLAY_DIALOGS_JS: &str = r#"
const labels = a.labels.map(l => l.toLowerCase());
let dismissed = 0;
for (const d of Array.from(document.querySelectorAll(a.dialog)).filter(isVisible)) {
    const btn = Array.from(d.querySelectorAll(a.footer_buttons + ', button'))
        .find(b => labels.some(l => txt(b) === l || txt(b).includes(l)));
    const el = btn || d.querySelector(a.close_icon);
    if (el) { el.click(); dismissed++; }
}
return { dismissed };
"#;

impl PageScript {
    pub fn kind(&self) -> &'static str {
        match self {
            PageScript::TableSnapshot { .. } => "table_snapshot",
            PageScript::TableHtml { .. } => "table_html",
            PageScript::PaginatorState { .. } => "paginator_state",
            PageScript::ClickPaginator { .. } => "click_paginator",
            PageScript::FocusAndSelect { .. } => "focus_and_select",
            PageScript::BlurInput { .. } => "blur_input",
            PageScript::ClickSearch { .. } => "click_search",
            PageScript::ClickAttachmentTrigger { .. } => "click_attachment_trigger",
            PageScript::DialogProbe { .. } => "dialog_probe",
            PageScript::CloseDialog { .. } => "close_dialog",
            PageScript::DownloadAll { .. } => "download_all",
            PageScript::HealthProbe { .. } => "health_probe",
            PageScript::DismissOverlayDialogs { .. } => "dismiss_overlay_dialogs",
        }
    }

    fn body(&self) -> &'static str {
        match self {
            PageScript::TableSnapshot { .. } => TABLE_SNAPSHOT_JS,
            PageScript::TableHtml { .. } => TABLE_HTML_JS,
            PageScript::PaginatorState { .. } => PAGINATOR_STATE_JS,
            PageScript::ClickPaginator { .. } => CLICK_PAGINATOR_JS,
            PageScript::FocusAndSelect { .. } => FOCUS_AND_SELECT_JS,
            PageScript::BlurInput { .. } => BLUR_INPUT_JS,
            PageScript::ClickSearch { .. } => CLICK_SEARCH_JS,
            PageScript::ClickAttachmentTrigger { .. } => CLICK_ATTACHMENT_TRIGGER_JS,
            PageScript::DialogProbe { .. } => DIALOG_PROBE_JS,
            PageScript::CloseDialog { .. } => CLOSE_DIALOG_JS,
            PageScript::DownloadAll { .. } => DOWNLOAD_ALL_JS,
            PageScript::HealthProbe { .. } => HEALTH_PROBE_JS,
            PageScript::DismissOverlayDialogs { .. } => DISMISS_OVERLAY_DIALOGS_JS,
        }
    }

    /// Render as a self-invoking JS expression.
    pub fn to_js(&self) -> String {
        let args = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!(
            "(() => {{ {prelude} const a = {args}; {body} }})()",
            prelude = PRELUDE,
            args = args,
            body = self.body()
        )
    }

    // ── constructors from config ─────────────────────────────────────────────

    pub fn table_snapshot(cfg: &PortalConfig) -> Self {
        let s = &cfg.selectors;
        PageScript::TableSnapshot {
            table_id: s.table_id.clone(),
            table_body: s.table_body.clone(),
            empty_row: s.empty_row.clone(),
            loading: s.loading_indicators.clone(),
            min_cells: cfg.thresholds.min_cells,
        }
    }

    pub fn table_html(cfg: &PortalConfig) -> Self {
        PageScript::TableHtml {
            table_id: cfg.selectors.table_id.clone(),
            table_body: cfg.selectors.table_body.clone(),
        }
    }

    pub fn paginator_state(cfg: &PortalConfig) -> Self {
        let s = &cfg.selectors;
        PageScript::PaginatorState {
            table_id: s.table_id.clone(),
            current: s.paginator_current.clone(),
            next: s.paginator_next.clone(),
            disabled_class: s.disabled_class.clone(),
        }
    }

    pub fn click_paginator(cfg: &PortalConfig, target: PaginatorTarget) -> Self {
        let s = &cfg.selectors;
        PageScript::ClickPaginator {
            table_id: s.table_id.clone(),
            target,
            next: s.paginator_next.clone(),
            prev: s.paginator_prev.clone(),
            page: s.paginator_page.clone(),
            disabled_class: s.disabled_class.clone(),
        }
    }

    pub fn click_search(cfg: &PortalConfig) -> Self {
        PageScript::ClickSearch {
            button_id: cfg.selectors.search_button_id.clone(),
            labels: cfg.keywords.search_labels.clone(),
        }
    }

    pub fn click_attachment_trigger(
        cfg: &PortalConfig,
        row_key: Option<&str>,
        column: KeyColumn,
        key: &str,
        strategies: Vec<StrategySpec>,
    ) -> Self {
        let key_column = match column {
            KeyColumn::SecondaryKey => cfg.columns.secondary_key,
            KeyColumn::CaseNumber => cfg.columns.case_number,
        };
        PageScript::ClickAttachmentTrigger {
            table_id: cfg.selectors.table_id.clone(),
            data_row: cfg.selectors.data_row.clone(),
            row_key: row_key.map(str::to_string),
            key: key.to_string(),
            key_column,
            actionable: cfg.selectors.actionable.clone(),
            strategies,
        }
    }

    pub fn dialog_probe(cfg: &PortalConfig) -> Self {
        PageScript::DialogProbe {
            dialog: cfg.selectors.dialog.clone(),
            title: cfg.selectors.dialog_title.clone(),
        }
    }

    pub fn close_dialog(cfg: &PortalConfig, method: CloseMethod) -> Self {
        let s = &cfg.selectors;
        PageScript::CloseDialog {
            method,
            dialog: s.dialog.clone(),
            close_icon: s.dialog_close_icon.clone(),
            footer_buttons: s.dialog_footer_buttons.clone(),
            labels: cfg.keywords.close_labels.clone(),
        }
    }

    pub fn download_all(cfg: &PortalConfig, click: bool) -> Self {
        PageScript::DownloadAll {
            dialog: cfg.selectors.dialog.clone(),
            button_id: cfg.selectors.download_all_id.clone(),
            labels: cfg.keywords.download_labels.clone(),
            actionable: cfg.selectors.actionable.clone(),
            click,
        }
    }

    pub fn health_probe(cfg: &PortalConfig) -> Self {
        PageScript::HealthProbe {
            table_id: cfg.selectors.table_id.clone(),
            data_row: cfg.selectors.data_row.clone(),
        }
    }

    pub fn dismiss_overlay_dialogs(cfg: &PortalConfig) -> Self {
        let s = &cfg.selectors;
        PageScript::DismissOverlayDialogs {
            dialog: s.dialog.clone(),
            footer_buttons: s.dialog_footer_buttons.clone(),
            close_icon: s.dialog_close_icon.clone(),
            labels: cfg.keywords.confirm_labels.clone(),
        }
    }
}
