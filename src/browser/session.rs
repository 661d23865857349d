//! The browsing-session capability the inbox pipeline drives.
//!
//! The pipeline never launches or closes a browser itself; it borrows a
//! `&dyn BrowserSession` from its caller. `ChromiumSession` is the production
//! implementation, the integration tests plug in a scripted fake.

use crate::portal::scripts::PageScript;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("page or browser is closed")]
    Closed,

    #[error("execution context destroyed")]
    ContextDestroyed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Keys the pipeline needs to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Backspace,
    Char(char),
}

impl Key {
    /// `(key, code, windows virtual key code)` as expected by `Input.dispatchKeyEvent`.
    pub fn descriptor(&self) -> (String, String, Option<i64>) {
        match self {
            Key::Escape => ("Escape".into(), "Escape".into(), Some(27)),
            Key::Backspace => ("Backspace".into(), "Backspace".into(), Some(8)),
            Key::Char(c) => {
                let code = if c.is_ascii_digit() {
                    format!("Digit{}", c)
                } else if c.is_ascii_alphabetic() {
                    format!("Key{}", c.to_ascii_uppercase())
                } else if *c == '/' {
                    "Slash".to_string()
                } else {
                    String::new()
                };
                (c.to_string(), code, None)
            }
        }
    }

    /// Text inserted by the key, if any.
    pub fn text(&self) -> Option<String> {
        match self {
            Key::Char(c) => Some(c.to_string()),
            _ => None,
        }
    }
}

/// A response paused at the `Response` stage of the interception channel.
#[derive(Debug, Clone, Default)]
pub struct InterceptedResponse {
    pub request_id: String,
    pub url: String,
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
}

impl InterceptedResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Body of a paused response as the protocol delivers it.
#[derive(Debug, Clone)]
pub struct InterceptedBody {
    pub body: String,
    pub base64_encoded: bool,
}

/// An armed response-interception channel.
///
/// While armed, every response of the page is paused until it is either passed
/// through or the channel is disarmed. Callers must disarm before dropping.
#[async_trait]
pub trait ResponseInterceptor: Send {
    /// Next paused response, or `None` once the channel is gone.
    async fn next_response(&mut self) -> Option<InterceptedResponse>;

    async fn body(&mut self, request_id: &str) -> Result<InterceptedBody, SessionError>;

    /// Let a paused response continue unmodified.
    async fn pass_through(&mut self, request_id: &str) -> Result<(), SessionError>;

    /// Stop intercepting. Pending paused responses are released.
    async fn disarm(&mut self) -> Result<(), SessionError>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), SessionError>;

    async fn reload(&self) -> Result<(), SessionError>;

    /// Raw URL of the page. Works without a live JS context.
    async fn current_url(&self) -> Result<String, SessionError>;

    fn is_closed(&self) -> bool;

    async fn evaluate(&self, script: &PageScript) -> Result<serde_json::Value, SessionError>;

    async fn press_key(&self, key: Key) -> Result<(), SessionError>;

    /// Arm a response-interception channel scoped to the current page target.
    async fn open_interceptor(&self) -> Result<Box<dyn ResponseInterceptor>, SessionError>;
}
