//! Consolidated-PDF capture from the network layer.
//!
//! The interception channel is armed before the download control is clicked
//! and disarmed on every exit path. While armed, every paused response that is
//! not the PDF is released immediately, otherwise the page's own resource
//! loading stalls.

use super::bridge::safe_evaluate;
use super::scripts::PageScript;
use crate::browser::{BrowserSession, InterceptedBody, InterceptedResponse, ResponseInterceptor};
use crate::core::config::PortalConfig;
use crate::core::error::{PortalError, PortalResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

#[derive(Debug, Clone)]
pub struct CapturedPdf {
    pub bytes: Vec<u8>,
    /// Base64 of `bytes`, ready for `NotificationRecord::attachment_pdf`.
    pub base64: String,
    pub size: usize,
    pub filename: String,
    /// False when `filename` was derived from the notification key.
    pub served_filename: bool,
    pub url: String,
}

#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    Captured(CapturedPdf),
    /// The control was clicked but no interception channel could be armed.
    ClickedWithoutCapture,
}

#[derive(Debug, Deserialize)]
struct DownloadAllResult {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    clicked: bool,
    #[serde(default)]
    via: Option<String>,
}

/// 200 responses served as an attachment or as a PDF/binary payload.
pub fn is_pdf_candidate(resp: &InterceptedResponse) -> bool {
    if resp.status != Some(200) {
        return false;
    }
    let disposition = resp
        .header("content-disposition")
        .unwrap_or_default()
        .to_ascii_lowercase();
    if disposition.contains("attachment") {
        return true;
    }
    let content_type = resp
        .header("content-type")
        .unwrap_or_default()
        .to_ascii_lowercase();
    content_type.contains("application/pdf")
        || content_type.contains("application/octet-stream")
        || content_type.contains("application/force-download")
}

fn unquote(v: &str) -> &str {
    let v = v.trim();
    v.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v)
}

fn basename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    (!base.is_empty()).then(|| base.to_string())
}

/// Served filename from a `Content-Disposition` value.
///
/// The RFC 5987 form (`filename*=UTF-8''…`) wins over the plain `filename=`.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in header.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let value = unquote(value);
                let encoded = value.split_once("''").map(|(_, rest)| rest).unwrap_or(value);
                if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
                    extended = basename(&decoded);
                }
            }
            "filename" => plain = basename(unquote(value)),
            _ => {}
        }
    }
    extended.or(plain)
}

/// `notification-<key>.pdf` with anything outside `[A-Za-z0-9._-]` replaced.
pub fn fallback_filename(key: &str) -> String {
    let safe: String = key
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.is_empty() {
        "notification.pdf".to_string()
    } else {
        format!("notification-{}.pdf", safe)
    }
}

async fn click_download(session: &dyn BrowserSession, cfg: &PortalConfig) -> bool {
    safe_evaluate::<DownloadAllResult>(session, &PageScript::download_all(cfg, true))
        .await
        .map(|r| r.clicked)
        .unwrap_or(false)
}

/// Wait for the first PDF candidate, releasing everything else.
async fn next_pdf_response(
    interceptor: &mut dyn ResponseInterceptor,
) -> Option<(InterceptedResponse, InterceptedBody)> {
    while let Some(resp) = interceptor.next_response().await {
        if !is_pdf_candidate(&resp) {
            if let Err(e) = interceptor.pass_through(&resp.request_id).await {
                debug!("download: pass-through of {} failed: {}", resp.url, e);
            }
            continue;
        }

        let body = interceptor.body(&resp.request_id).await;
        if let Err(e) = interceptor.pass_through(&resp.request_id).await {
            debug!("download: releasing {} failed: {}", resp.url, e);
        }
        match body {
            Ok(body) => return Some((resp, body)),
            Err(e) => warn!("download: body of {} unavailable: {}", resp.url, e),
        }
    }
    None
}

fn validate(
    resp: InterceptedResponse,
    body: InterceptedBody,
    fallback_key: &str,
) -> PortalResult<CapturedPdf> {
    let (bytes, base64) = if body.base64_encoded {
        let bytes = STANDARD
            .decode(body.body.trim())
            .map_err(|e| PortalError::InvalidFormat(format!("undecodable body: {}", e)))?;
        (bytes, body.body.trim().to_string())
    } else {
        let bytes = body.body.into_bytes();
        let encoded = STANDARD.encode(&bytes);
        (bytes, encoded)
    };

    if !bytes.starts_with(PDF_MAGIC) {
        let head: Vec<u8> = bytes.iter().take(4).copied().collect();
        return Err(PortalError::InvalidFormat(format!(
            "payload does not start with %PDF (got {:?})",
            String::from_utf8_lossy(&head)
        )));
    }

    let served = resp
        .header("content-disposition")
        .and_then(parse_content_disposition_filename);
    let served_filename = served.is_some();
    let filename = served.unwrap_or_else(|| fallback_filename(fallback_key));

    Ok(CapturedPdf {
        size: bytes.len(),
        bytes,
        base64,
        filename,
        served_filename,
        url: resp.url,
    })
}

/// Click "download all" in the open dialog and capture the PDF it produces.
///
/// `fallback_key` names the file when the server sends no filename.
pub async fn capture_consolidated_pdf(
    session: &dyn BrowserSession,
    cfg: &PortalConfig,
    fallback_key: &str,
) -> PortalResult<DownloadOutcome> {
    let located = safe_evaluate::<DownloadAllResult>(session, &PageScript::download_all(cfg, false))
        .await;
    match located {
        Some(DownloadAllResult { found: true, via, .. }) => {
            debug!("download: control found via {}", via.as_deref().unwrap_or("?"));
        }
        _ => {
            return Err(PortalError::NotFound(
                "download-all control not in the open dialog".into(),
            ))
        }
    }

    let mut interceptor = match session.open_interceptor().await {
        Ok(i) => i,
        Err(e) => {
            warn!("download: interception unavailable ({}); clicking without capture", e);
            if click_download(session, cfg).await {
                return Ok(DownloadOutcome::ClickedWithoutCapture);
            }
            return Err(PortalError::NotFound("download-all control not clickable".into()));
        }
    };

    let result = if click_download(session, cfg).await {
        let ceiling = cfg.pdf_capture_timeout();
        match tokio::time::timeout(ceiling, next_pdf_response(interceptor.as_mut())).await {
            Ok(Some((resp, body))) => validate(resp, body, fallback_key),
            Ok(None) => Err(PortalError::Timeout(
                "interception channel closed before a PDF arrived".into(),
            )),
            Err(_) => Err(PortalError::Timeout(format!(
                "no PDF response within {}s",
                ceiling.as_secs()
            ))),
        }
    } else {
        Err(PortalError::NotFound("download-all control not clickable".into()))
    };

    if let Err(e) = interceptor.disarm().await {
        warn!("download: disarming interception failed: {}", e);
    }

    match &result {
        Ok(pdf) => info!(
            "download: captured {} ({} bytes) from {}",
            pdf.filename, pdf.size, pdf.url
        ),
        Err(e) => warn!("download: {}", e),
    }
    result.map(DownloadOutcome::Captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, headers: &[(&str, &str)]) -> InterceptedResponse {
        InterceptedResponse {
            request_id: "r1".into(),
            url: "https://portal.test/descarga".into(),
            status: Some(status),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_candidate_detection() {
        assert!(is_pdf_candidate(&response(200, &[("Content-Type", "application/pdf")])));
        assert!(is_pdf_candidate(&response(
            200,
            &[("Content-Disposition", "attachment; filename=x.zip")]
        )));
        assert!(!is_pdf_candidate(&response(302, &[("Content-Type", "application/pdf")])));
        assert!(!is_pdf_candidate(&response(200, &[("Content-Type", "text/css")])));
    }

    #[test]
    fn test_extended_filename_wins() {
        let h = r#"attachment; filename="fallback.pdf"; filename*=UTF-8''Notificaci%C3%B3n%20123.pdf"#;
        assert_eq!(
            parse_content_disposition_filename(h).as_deref(),
            Some("Notificación 123.pdf")
        );
    }

    #[test]
    fn test_plain_filename_and_paths() {
        assert_eq!(
            parse_content_disposition_filename(r#"attachment; filename="consolidado.pdf""#).as_deref(),
            Some("consolidado.pdf")
        );
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=../../etc/x.pdf").as_deref(),
            Some("x.pdf")
        );
        assert_eq!(parse_content_disposition_filename("inline"), None);
    }

    #[test]
    fn test_fallback_filename_sanitizes() {
        assert_eq!(fallback_filename("N-2024/77"), "notification-N-2024_77.pdf");
        assert_eq!(fallback_filename("  "), "notification.pdf");
    }

    #[test]
    fn test_validate_rejects_non_pdf() {
        let body = InterceptedBody {
            body: STANDARD.encode(b"<html>error</html>"),
            base64_encoded: true,
        };
        let err = validate(response(200, &[]), body, "k").unwrap_err();
        assert!(matches!(err, PortalError::InvalidFormat(_)));
    }

    #[test]
    fn test_validate_accepts_pdf_and_derives_name() {
        let body = InterceptedBody {
            body: STANDARD.encode(b"%PDF-1.7\n..."),
            base64_encoded: true,
        };
        let pdf = validate(response(200, &[]), body, "N-1").unwrap();
        assert_eq!(pdf.size, 12);
        assert_eq!(pdf.filename, "notification-N-1.pdf");
        assert!(!pdf.served_filename);
    }
}
