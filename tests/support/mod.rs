//! Scripted in-memory inbox portal for driving the pipeline without a browser.
#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use notice_scout::browser::{
    BrowserSession, InterceptedBody, InterceptedResponse, Key, ResponseInterceptor, SessionError,
};
use notice_scout::core::config::PortalConfig;
use notice_scout::portal::scripts::{CloseMethod, PageScript, PaginatorTarget};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const INBOX_URL: &str = "https://casilla.portal.test/app/bandeja/notificaciones.xhtml";
pub const LOGIN_URL: &str = "https://casilla.portal.test/auth/login.xhtml?expired=1";
pub const ATTACHMENTS_TITLE: &str = "Anexos de la notificación";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> PortalConfig {
    let mut cfg = PortalConfig::default().with_inbox_url(INBOX_URL);
    cfg.polling.key_delay_ms = 0;
    cfg
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn key(i: usize) -> String {
    format!("N-{:03}", i)
}

/// One-shot override of the next table snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snap {
    Loading,
    Absent,
    Rows(usize),
    /// Body present, zero rows, no empty indicator.
    Bare,
    Empty,
}

#[derive(Debug, Clone)]
pub struct FakeRow {
    pub secondary_key: String,
    pub case_number: String,
    pub has_attachment: bool,
}

#[derive(Debug)]
pub struct FakeState {
    pub rows: Vec<FakeRow>,
    pub per_page: usize,
    pub page: u32,
    pub url: String,
    pub closed: bool,
    pub context_dead: bool,

    pub snapshots: VecDeque<Snap>,
    pub loading_forever: bool,
    pub absent_forever: bool,
    pub rows_hidden_until_search: bool,
    pub filter_applied: bool,
    /// Next clicks report success without moving.
    pub stuck_paginator: bool,
    /// Paginator renders without the `(x of y)` text.
    pub no_indicator: bool,
    /// Numbered page links are not rendered.
    pub no_page_links: bool,

    pub open_dialog: Option<String>,
    pub failing_open: HashSet<String>,
    pub error_dialog_on_open: HashSet<String>,
    pub kill_context_after_open_failures: Option<usize>,
    pub open_failures: usize,
    pub shuffle_on_open: bool,
    pub close_icon_broken: bool,
    pub escape_only: bool,
    /// No close method or key dismisses the open dialog.
    pub stuck_dialog: bool,

    pub reload_restores: bool,
    pub reload_redirects_login: bool,
    pub goto_restores: bool,

    pub interception_unavailable: bool,
    pub armed: bool,
    pub pending: VecDeque<InterceptedResponse>,
    pub bodies: HashMap<String, InterceptedBody>,
    pub invalid_pdf: bool,
    pub no_pdf_response: bool,
    pub next_response_id: usize,

    pub arms: usize,
    pub disarms: usize,
    pub passed_through: Vec<String>,
    pub download_clicks: usize,
    pub opened_for: Vec<String>,
    pub relocations: usize,
    pub page_visits: Vec<u32>,
    pub reloads: usize,
    pub gotos: usize,
    pub typed: String,
    pub calls: Vec<String>,
}

impl FakeState {
    fn new(rows: usize, per_page: usize) -> Self {
        Self {
            rows: (1..=rows)
                .map(|i| FakeRow {
                    secondary_key: key(i),
                    case_number: format!("{:05}-2024", i),
                    has_attachment: true,
                })
                .collect(),
            per_page: per_page.max(1),
            page: 1,
            url: INBOX_URL.to_string(),
            closed: false,
            context_dead: false,
            snapshots: VecDeque::new(),
            loading_forever: false,
            absent_forever: false,
            rows_hidden_until_search: false,
            filter_applied: false,
            stuck_paginator: false,
            no_indicator: false,
            no_page_links: false,
            open_dialog: None,
            failing_open: HashSet::new(),
            error_dialog_on_open: HashSet::new(),
            kill_context_after_open_failures: None,
            open_failures: 0,
            shuffle_on_open: false,
            close_icon_broken: false,
            escape_only: false,
            stuck_dialog: false,
            reload_restores: true,
            reload_redirects_login: false,
            goto_restores: true,
            interception_unavailable: false,
            armed: false,
            pending: VecDeque::new(),
            bodies: HashMap::new(),
            invalid_pdf: false,
            no_pdf_response: false,
            next_response_id: 0,
            arms: 0,
            disarms: 0,
            passed_through: Vec::new(),
            download_clicks: 0,
            opened_for: Vec::new(),
            relocations: 0,
            page_visits: Vec::new(),
            reloads: 0,
            gotos: 0,
            typed: String::new(),
            calls: Vec::new(),
        }
    }

    fn rows_visible_in_dataset(&self) -> usize {
        if self.rows_hidden_until_search && !self.filter_applied {
            0
        } else {
            self.rows.len()
        }
    }

    fn total_pages(&self) -> u32 {
        let n = self.rows_visible_in_dataset();
        (n.div_ceil(self.per_page)).max(1) as u32
    }

    fn page_range(&self) -> (usize, usize) {
        let n = self.rows_visible_in_dataset();
        let start = (self.page as usize - 1) * self.per_page;
        if start >= n {
            return (0, 0);
        }
        (start, (start + self.per_page).min(n))
    }

    fn visible(&self) -> &[FakeRow] {
        let (start, end) = self.page_range();
        &self.rows[start..end]
    }

    fn on_login_page(&self) -> bool {
        self.url.contains("/auth/")
    }

    fn set_page(&mut self, page: u32) {
        if self.page != page {
            self.page = page;
            self.page_visits.push(page);
        }
    }

    fn restore(&mut self, url: &str) {
        self.context_dead = false;
        self.url = url.to_string();
        self.page = 1;
        self.open_dialog = None;
    }

    fn snapshot(&mut self) -> Value {
        let snap = self.snapshots.pop_front().unwrap_or_else(|| {
            if self.loading_forever {
                Snap::Loading
            } else if self.absent_forever || self.on_login_page() {
                Snap::Absent
            } else {
                match self.visible().len() {
                    0 => Snap::Empty,
                    n => Snap::Rows(n),
                }
            }
        });
        match snap {
            Snap::Loading => json!({ "loading": true, "table_present": true, "row_count": 0, "empty_row": false }),
            Snap::Absent => json!({ "loading": false, "table_present": false, "row_count": 0, "empty_row": false }),
            Snap::Rows(n) => json!({ "loading": false, "table_present": true, "row_count": n, "empty_row": false }),
            Snap::Bare => json!({ "loading": false, "table_present": true, "row_count": 0, "empty_row": false, "text": "" }),
            Snap::Empty => json!({ "loading": false, "table_present": true, "row_count": 0, "empty_row": true, "text": "No se encontraron registros" }),
        }
    }

    fn table_html(&self) -> String {
        let (start, _) = self.page_range();
        let mut html = String::from(r#"<tbody class="ui-datatable-data">"#);
        if self.visible().is_empty() {
            html.push_str(
                r#"<tr class="ui-datatable-empty-message"><td colspan="7">No se encontraron registros</td></tr>"#,
            );
        }
        for (i, row) in self.visible().iter().enumerate() {
            let ri = start + i;
            let action = if row.has_attachment {
                format!(
                    r##"<a id="frm:tblLista:{}:btnAnexo" href="#"><i class="fa fa-paperclip"></i></a>"##,
                    ri
                )
            } else {
                String::new()
            };
            html.push_str(&format!(
                r#"<tr data-ri="{ri}"><td>{n}</td><td>{key}</td><td>{case}</td><td>Resolución</td><td>Juzgado Civil</td><td>01/03/2024 09:00</td><td>{action}</td></tr>"#,
                ri = ri,
                n = ri + 1,
                key = row.secondary_key,
                case = row.case_number,
                action = action
            ));
        }
        html.push_str("</tbody>");
        html
    }

    fn key_in_column(&self, ri: usize, key_column: usize) -> String {
        let row = &self.rows[ri];
        let raw = match key_column {
            1 => row.secondary_key.as_str(),
            2 => row.case_number.as_str(),
            _ => "",
        };
        normalize(raw)
    }

    fn click_trigger(&mut self, row_key: Option<&str>, key: &str, key_column: usize) -> Value {
        let wanted = normalize(key);
        if wanted.is_empty() {
            return json!({ "row_found": false, "relocated": false, "strategy": null, "clicked": false });
        }
        let (start, end) = self.page_range();
        let hinted = row_key
            .and_then(|k| k.parse::<usize>().ok())
            .filter(|ri| *ri >= start && *ri < end)
            .filter(|ri| self.key_in_column(*ri, key_column) == wanted);
        let (idx, relocated) = match hinted {
            Some(ri) => (Some(ri), false),
            None => {
                let found = (start..end).find(|i| self.key_in_column(*i, key_column) == wanted);
                (found, found.is_some())
            }
        };
        let Some(idx) = idx else {
            return json!({ "row_found": false, "relocated": false, "strategy": null, "clicked": false });
        };
        if relocated {
            self.relocations += 1;
        }
        if !self.rows[idx].has_attachment {
            return json!({ "row_found": true, "relocated": relocated, "strategy": null, "clicked": false });
        }

        let row = &self.rows[idx];
        let identity = if row.secondary_key.is_empty() {
            row.case_number.clone()
        } else {
            row.secondary_key.clone()
        };
        if self.failing_open.contains(&identity) {
            self.open_failures += 1;
            if let Some(limit) = self.kill_context_after_open_failures {
                if self.open_failures >= limit {
                    self.context_dead = true;
                }
            }
        } else if self.error_dialog_on_open.contains(&identity) {
            self.open_dialog = Some("Error del sistema".to_string());
        } else {
            self.open_dialog = Some(ATTACHMENTS_TITLE.to_string());
            self.opened_for.push(identity);
            if self.shuffle_on_open {
                self.rows[start..end].rotate_left(1);
            }
        }
        json!({ "row_found": true, "relocated": relocated, "strategy": "icon_class", "clicked": true })
    }

    fn queue_download_responses(&mut self) {
        self.next_response_id += 1;
        let noise_id = format!("noise-{}", self.next_response_id);
        self.pending.push_back(InterceptedResponse {
            request_id: noise_id,
            url: "https://casilla.portal.test/javax.faces.resource/theme.css".into(),
            status: Some(200),
            headers: vec![("Content-Type".into(), "text/css".into())],
        });
        if self.no_pdf_response {
            return;
        }
        let pdf_id = format!("pdf-{}", self.next_response_id);
        let payload: &[u8] = if self.invalid_pdf {
            b"<html><body>Error interno</body></html>"
        } else {
            b"%PDF-1.4\n% consolidated\n%%EOF"
        };
        self.bodies.insert(
            pdf_id.clone(),
            InterceptedBody {
                body: STANDARD.encode(payload),
                base64_encoded: true,
            },
        );
        self.pending.push_back(InterceptedResponse {
            request_id: pdf_id,
            url: "https://casilla.portal.test/app/bandeja/notificaciones.xhtml".into(),
            status: Some(200),
            headers: vec![
                ("Content-Type".into(), "application/pdf".into()),
                (
                    "Content-Disposition".into(),
                    "attachment; filename=\"consolidado.pdf\"; filename*=UTF-8''Consolidado%20Notificaci%C3%B3n.pdf".into(),
                ),
            ],
        });
    }

    fn dialogs(&self) -> Value {
        let mut list = vec![json!({ "id": "frm:dlgHidden", "title": ATTACHMENTS_TITLE, "visible": false })];
        if let Some(title) = &self.open_dialog {
            list.push(json!({ "id": "frm:dlgAnexos", "title": title, "visible": true }));
        }
        Value::Array(list)
    }

    fn run_script(&mut self, script: &PageScript) -> Value {
        self.calls.push(script.kind().to_string());
        match script {
            PageScript::TableSnapshot { .. } => self.snapshot(),
            PageScript::TableHtml { .. } => json!({ "html": self.table_html() }),
            PageScript::PaginatorState { .. } => {
                let total = self.total_pages();
                let text = (!self.no_indicator).then(|| format!("({} of {})", self.page, total));
                json!({
                    "text": text,
                    "next_present": true,
                    "next_enabled": self.page < total,
                })
            }
            PageScript::ClickPaginator { target, .. } => {
                let total = self.total_pages();
                let next = match target {
                    PaginatorTarget::Next if self.page < total => Some(self.page + 1),
                    PaginatorTarget::Prev if self.page > 1 => Some(self.page - 1),
                    PaginatorTarget::Page(n) if !self.no_page_links && *n >= 1 && *n <= total => {
                        Some(*n)
                    }
                    _ => None,
                };
                match next {
                    Some(_) if self.stuck_paginator => json!({ "clicked": true }),
                    Some(p) => {
                        self.set_page(p);
                        json!({ "clicked": true })
                    }
                    None => json!({ "clicked": false }),
                }
            }
            PageScript::FocusAndSelect { selector } => {
                self.calls.push(format!("focus:{}", selector));
                self.typed.push('|');
                json!({ "found": true })
            }
            PageScript::BlurInput { .. } => json!({ "found": true }),
            PageScript::ClickSearch { .. } => {
                self.filter_applied = true;
                self.page = 1;
                json!({ "clicked": true, "via": "id" })
            }
            PageScript::ClickAttachmentTrigger {
                row_key,
                key,
                key_column,
                ..
            } => self.click_trigger(row_key.as_deref(), key, *key_column),
            PageScript::DialogProbe { .. } => self.dialogs(),
            PageScript::CloseDialog { method, .. } => {
                if self.open_dialog.is_none() {
                    return json!({ "clicked": false, "open": 0 });
                }
                self.calls.push(format!("close:{:?}", method));
                let works = !self.escape_only
                    && !self.stuck_dialog
                    && match method {
                        CloseMethod::CloseIcon => !self.close_icon_broken,
                        CloseMethod::FooterButton => true,
                    };
                if works {
                    self.open_dialog = None;
                }
                json!({ "clicked": true, "open": 1 })
            }
            PageScript::DownloadAll { click, .. } => {
                let found = self
                    .open_dialog
                    .as_deref()
                    .map(|t| t == ATTACHMENTS_TITLE)
                    .unwrap_or(false);
                if !found {
                    return json!({ "found": false, "clicked": false, "via": null });
                }
                if *click {
                    self.download_clicks += 1;
                    if self.armed {
                        self.queue_download_responses();
                    }
                }
                json!({ "found": true, "clicked": *click, "via": "id" })
            }
            PageScript::HealthProbe { .. } => json!({
                "has_table": !self.on_login_page(),
                "row_count": self.visible().len(),
            }),
            PageScript::DismissOverlayDialogs { .. } => {
                let dismissed = usize::from(self.open_dialog.take().is_some());
                json!({ "dismissed": dismissed })
            }
        }
    }
}

/// Shared handle; clones see the same portal.
#[derive(Clone)]
pub struct FakePortal {
    state: Arc<Mutex<FakeState>>,
}

impl FakePortal {
    pub fn new(rows: usize, per_page: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::new(rows, per_page))),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn configure(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state());
        self
    }

    pub fn configure_in_place(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state());
    }
}

#[async_trait]
impl BrowserSession for FakePortal {
    async fn goto(&self, url: &str) -> Result<(), SessionError> {
        let mut s = self.state();
        if s.closed {
            return Err(SessionError::Closed);
        }
        s.gotos += 1;
        s.calls.push(format!("goto:{}", url));
        if s.reload_redirects_login {
            s.restore(LOGIN_URL);
            return Ok(());
        }
        if !s.goto_restores {
            return Err(SessionError::Protocol("net::ERR_CONNECTION_RESET".into()));
        }
        s.restore(url);
        Ok(())
    }

    async fn reload(&self) -> Result<(), SessionError> {
        let mut s = self.state();
        if s.closed {
            return Err(SessionError::Closed);
        }
        s.reloads += 1;
        s.calls.push("reload".into());
        if s.reload_redirects_login {
            s.restore(LOGIN_URL);
        } else if s.reload_restores {
            let url = s.url.clone();
            s.restore(&url);
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        let s = self.state();
        if s.closed {
            return Err(SessionError::Closed);
        }
        Ok(s.url.clone())
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }

    async fn evaluate(&self, script: &PageScript) -> Result<Value, SessionError> {
        let mut s = self.state();
        if s.closed {
            return Err(SessionError::Closed);
        }
        if s.context_dead {
            s.calls.push(format!("dead:{}", script.kind()));
            return Err(SessionError::ContextDestroyed);
        }
        Ok(s.run_script(script))
    }

    async fn press_key(&self, key: Key) -> Result<(), SessionError> {
        let mut s = self.state();
        if s.closed {
            return Err(SessionError::Closed);
        }
        s.calls.push(format!("key:{:?}", key));
        match key {
            Key::Char(c) => s.typed.push(c),
            Key::Escape if !s.stuck_dialog => {
                s.open_dialog = None;
            }
            _ => {}
        }
        Ok(())
    }

    async fn open_interceptor(&self) -> Result<Box<dyn ResponseInterceptor>, SessionError> {
        let mut s = self.state();
        if s.closed {
            return Err(SessionError::Closed);
        }
        if s.interception_unavailable {
            return Err(SessionError::Unsupported("Fetch domain not available".into()));
        }
        s.armed = true;
        s.arms += 1;
        Ok(Box::new(FakeInterceptor {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeInterceptor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeInterceptor {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ResponseInterceptor for FakeInterceptor {
    async fn next_response(&mut self) -> Option<InterceptedResponse> {
        loop {
            {
                let mut s = self.state();
                if let Some(resp) = s.pending.pop_front() {
                    return Some(resp);
                }
                if s.closed {
                    return None;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn body(&mut self, request_id: &str) -> Result<InterceptedBody, SessionError> {
        self.state()
            .bodies
            .get(request_id)
            .cloned()
            .ok_or_else(|| SessionError::Protocol(format!("no body for {}", request_id)))
    }

    async fn pass_through(&mut self, request_id: &str) -> Result<(), SessionError> {
        self.state().passed_through.push(request_id.to_string());
        Ok(())
    }

    async fn disarm(&mut self) -> Result<(), SessionError> {
        let mut s = self.state();
        s.armed = false;
        s.disarms += 1;
        s.pending.clear();
        Ok(())
    }
}
