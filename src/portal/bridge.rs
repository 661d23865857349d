//! Safe-evaluate bridge.
//!
//! Every DOM read goes through [`safe_evaluate`]. The portal rebuilds regions
//! of the page with AJAX and replaces the execution context on full reloads,
//! so evaluation failures are routine. They are absorbed here and surface as
//! `None`; callers treat that as "not available right now".

use crate::browser::{BrowserSession, SessionError};
use crate::portal::scripts::PageScript;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Run `script` and decode its result. `None` on a closed session, a lost
/// context, a protocol error, or a result that does not match `T`.
pub async fn safe_evaluate<T: DeserializeOwned>(
    session: &dyn BrowserSession,
    script: &PageScript,
) -> Option<T> {
    if session.is_closed() {
        debug!("bridge: {} skipped, session closed", script.kind());
        return None;
    }

    let value = match session.evaluate(script).await {
        Ok(v) => v,
        Err(SessionError::ContextDestroyed) => {
            debug!("bridge: {} hit a destroyed context", script.kind());
            return None;
        }
        Err(e) => {
            debug!("bridge: {} failed: {}", script.kind(), e);
            return None;
        }
    };

    match serde_json::from_value::<T>(value) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("bridge: {} returned unexpected shape: {}", script.kind(), e);
            None
        }
    }
}

/// Like [`safe_evaluate`] for actions whose result is irrelevant.
/// Returns whether the script ran at all.
pub async fn safe_execute(session: &dyn BrowserSession, script: &PageScript) -> bool {
    safe_evaluate::<serde_json::Value>(session, script)
        .await
        .is_some()
}
