//! Response rendering: content hashing, conditional requests, error mapping.

use std::time::SystemTime;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use docrest_domain::{Collection, Document};
use docrest_server::ServiceError;

/// A renderable response payload.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Document(Document),
    Collection(Collection),
}

impl ResponsePayload {
    /// The instant driving `Last-Modified`, when the payload exposes one.
    fn last_modified(&self) -> Option<DateTime<Utc>> {
        match self {
            ResponsePayload::Document(document) => document.last_modification_date,
            ResponsePayload::Collection(_) => None,
        }
    }
}

/// Computes a strong ETag over the payload's canonical JSON encoding.
///
/// serde_json emits object keys in sorted order, so two payloads in the same
/// state always hash identically.
fn compute_etag(payload: &ResponsePayload) -> Option<String> {
    let encoded = serde_json::to_vec(payload).ok()?;
    let digest = Sha256::digest(&encoded);
    Some(format!("\"{}\"", hex::encode(digest)))
}

/// Renders a 204 for operations without a payload.
pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Renders a payload with conditional-GET semantics.
///
/// Sets `ETag` (and `Last-Modified` where the payload exposes one), honours
/// `If-None-Match` and `If-Modified-Since` with 304, and otherwise returns
/// the JSON body with 200 — or 202 for `POST`, whose payload is the
/// freshly created document.
pub fn render(
    method: &Method,
    request_headers: &HeaderMap,
    pretty: bool,
    payload: &ResponsePayload,
) -> Response {
    let mut headers = HeaderMap::new();

    let etag = compute_etag(payload);
    if let Some(ref etag) = etag {
        if let Ok(value) = HeaderValue::from_str(etag) {
            headers.insert(header::ETAG, value);
        }

        let if_none_match = request_headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok());
        if if_none_match == Some(etag.as_str()) {
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }
    }

    if let Some(last_modified) = payload.last_modified() {
        let last_modified = SystemTime::from(last_modified);
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(last_modified)) {
            headers.insert(header::LAST_MODIFIED, value);
        }

        let if_modified_since = request_headers
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| httpdate::parse_http_date(v).ok());
        if let Some(if_modified_since) = if_modified_since {
            if last_modified <= if_modified_since {
                return (StatusCode::NOT_MODIFIED, headers).into_response();
            }
        }
    }

    let body = if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            return error_response(&ServiceError::Internal {
                message: format!("response encoding failed: {e}"),
            })
        }
    };

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    let status = if *method == Method::POST {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    (status, headers, body).into_response()
}

/// Maps an error to its status code and plain-text body.
///
/// Internal failures are logged with the full error before being reduced to
/// an opaque message; client errors are logged at debug level only.
pub fn error_response(err: &ServiceError) -> Response {
    if err.is_bad_request() {
        debug!(error = %err, "rejecting bad request");
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    }
    if err.is_not_authorized() {
        debug!(error = %err, "rejecting unauthorized request");
        return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
    }
    if err.is_not_found() {
        debug!(error = %err, "target not found");
        return (StatusCode::NOT_FOUND, "Data not found".to_string()).into_response();
    }

    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
        .into_response()
}
