//! `BrowserSession` over a single `chromiumoxide` page.

use super::session::{
    BrowserSession, InterceptedBody, InterceptedResponse, Key, ResponseInterceptor, SessionError,
};
use crate::portal::scripts::PageScript;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, DisableParams, EnableParams, EventRequestPaused, GetResponseBodyParams,
    RequestId, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Classify a driver error. The driver only hands out strings for the
/// interesting cases, so this is message based.
pub(crate) fn classify_error(err: impl std::fmt::Display) -> SessionError {
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("execution context was destroyed")
        || lower.contains("cannot find context")
        || lower.contains("inspected target navigated")
        || lower.contains("context with specified id")
    {
        SessionError::ContextDestroyed
    } else if lower.contains("receiver is gone")
        || lower.contains("target closed")
        || lower.contains("session closed")
        || lower.contains("no such target")
        || lower.contains("channel closed")
    {
        SessionError::Closed
    } else {
        SessionError::Protocol(msg)
    }
}

#[derive(Clone)]
pub struct ChromiumSession {
    page: Page,
    closed: Arc<AtomicBool>,
}

impl ChromiumSession {
    /// `closed` is flipped by whoever owns the CDP handler loop when it ends.
    pub fn new(page: Page, closed: Arc<AtomicBool>) -> Self {
        Self { page, closed }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    fn guard(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType, key: Key) -> Result<(), SessionError> {
        let (name, code, vk) = key.descriptor();
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(name)
            .code(code);
        if let Some(vk) = vk {
            builder = builder.windows_virtual_key_code(vk);
        }
        if matches!(kind, DispatchKeyEventType::KeyDown) {
            if let Some(text) = key.text() {
                builder = builder.text(text);
            }
        }
        let params = builder.build().map_err(SessionError::Protocol)?;
        self.page.execute(params).await.map_err(classify_error)?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&self, url: &str) -> Result<(), SessionError> {
        self.guard()?;
        self.page.goto(url).await.map_err(classify_error)?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), SessionError> {
        self.guard()?;
        self.page.reload().await.map_err(classify_error)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        self.guard()?;
        self.page
            .url()
            .await
            .map_err(classify_error)?
            .ok_or_else(|| SessionError::Protocol("page has no url".to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn evaluate(&self, script: &PageScript) -> Result<serde_json::Value, SessionError> {
        self.guard()?;
        let result = self
            .page
            .evaluate(script.to_js())
            .await
            .map_err(classify_error)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn press_key(&self, key: Key) -> Result<(), SessionError> {
        self.guard()?;
        self.dispatch_key(DispatchKeyEventType::KeyDown, key).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn open_interceptor(&self) -> Result<Box<dyn ResponseInterceptor>, SessionError> {
        self.guard()?;
        // Listener first: a response paused before the stream exists would stall the page.
        let events = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(classify_error)?;

        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Response)
            .build();
        self.page
            .execute(EnableParams::builder().pattern(pattern).build())
            .await
            .map_err(classify_error)?;

        debug!("interceptor: Fetch domain armed at response stage");
        Ok(Box::new(ChromiumInterceptor {
            page: self.page.clone(),
            events,
            armed: true,
        }))
    }
}

pub struct ChromiumInterceptor {
    page: Page,
    events: EventStream<EventRequestPaused>,
    armed: bool,
}

#[async_trait]
impl ResponseInterceptor for ChromiumInterceptor {
    async fn next_response(&mut self) -> Option<InterceptedResponse> {
        let event = self.events.next().await?;
        let headers = event
            .response_headers
            .as_ref()
            .map(|hs| {
                hs.iter()
                    .map(|h| (h.name.clone(), h.value.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Some(InterceptedResponse {
            request_id: event.request_id.inner().clone(),
            url: event.request.url.clone(),
            status: event
                .response_status_code
                .and_then(|code| u16::try_from(code).ok()),
            headers,
        })
    }

    async fn body(&mut self, request_id: &str) -> Result<InterceptedBody, SessionError> {
        let resp = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await
            .map_err(classify_error)?;
        Ok(InterceptedBody {
            body: resp.result.body.clone(),
            base64_encoded: resp.result.base64_encoded,
        })
    }

    async fn pass_through(&mut self, request_id: &str) -> Result<(), SessionError> {
        self.page
            .execute(ContinueRequestParams::new(RequestId::new(request_id)))
            .await
            .map_err(classify_error)?;
        Ok(())
    }

    async fn disarm(&mut self) -> Result<(), SessionError> {
        if !self.armed {
            return Ok(());
        }
        self.armed = false;
        self.page
            .execute(DisableParams::default())
            .await
            .map_err(classify_error)?;
        debug!("interceptor: Fetch domain disarmed");
        Ok(())
    }
}

impl Drop for ChromiumInterceptor {
    fn drop(&mut self) {
        if self.armed {
            warn!("interceptor dropped while armed; disabling Fetch domain in background");
            let page = self.page.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = page.execute(DisableParams::default()).await;
                });
            }
        }
    }
}
