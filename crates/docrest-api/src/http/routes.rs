//! The document router and request pipeline.
//!
//! Document addresses are arbitrary-depth paths, so there is no static route
//! table: a single fallback handler authenticates the caller, parses and
//! classifies the target, dispatches on classification × method, and renders
//! the result.

use axum::body::{to_bytes, Body};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Request};
use axum::response::Response;
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;

use docrest_domain::{Document, ObjectRef, Properties, Target, User};
use docrest_server::{ServiceError, ServiceResult};

use super::render::{error_response, no_content, render, ResponsePayload};
use super::state::AppState;
use crate::auth::bearer_token;

/// Request body size limit (1MB). Prevents memory exhaustion from oversized
/// payloads.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Maximum and default number of documents per collection listing.
const MAX_LIMIT: i64 = 100;

/// Recognized query parameters; anything else is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(rename = "orderBy", default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub print: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
}

/// Creates the document router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(DEFAULT_BODY_LIMIT))
}

/// Clamps `?limit=` to `[0, 100]`; missing or unparsable values default to
/// 100.
fn parse_limit(raw: Option<&str>) -> usize {
    match raw.and_then(|v| v.parse::<i64>().ok()) {
        Some(value) => value.clamp(0, MAX_LIMIT) as usize,
        None => MAX_LIMIT as usize,
    }
}

/// Splits `?orderBy=` on `/` into field names.
fn parse_order_by(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split('/')
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Decodes a JSON body; an empty body yields the type's default.
async fn decode_body<T>(body: Body) -> ServiceResult<T>
where
    T: DeserializeOwned + Default,
{
    let bytes = to_bytes(body, DEFAULT_BODY_LIMIT)
        .await
        .map_err(|e| ServiceError::bad_request(format!("Unable to read body: {e}")))?;
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| ServiceError::bad_request(format!("Unable to decode JSON body: {e}")))
}

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    params: &QueryParams,
) -> ServiceResult<User> {
    match &state.authenticator {
        None => Ok(User::default()),
        Some(authenticator) => {
            let token = bearer_token(headers, params.auth.as_deref());
            authenticator.authenticate(token.as_deref()).await
        }
    }
}

async fn handle_request(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
    request: Request<Body>,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();
    let body = request.into_body();
    let pretty = params.print.as_deref() == Some("pretty");

    let user = match authenticate(&state, &headers, &params).await {
        Ok(user) => user,
        Err(e) => return error_response(&e),
    };

    let target = match ObjectRef::parse(&path) {
        Ok(target) => target,
        Err(e) => return error_response(&e.into()),
    };

    match target.classify() {
        Target::Document(document) => match method.as_str() {
            "GET" => match state.service.get_document(&document, &user).await {
                Ok(data) => render(&method, &headers, pretty, &ResponsePayload::Document(data)),
                Err(e) => error_response(&e),
            },
            "PUT" => {
                let payload: Document = match decode_body(body).await {
                    Ok(payload) => payload,
                    Err(e) => return error_response(&e),
                };
                match state.service.put_document(&document, payload, &user).await {
                    Ok(()) => no_content(),
                    Err(e) => error_response(&e),
                }
            }
            "POST" | "PATCH" => {
                let payload: Properties = match decode_body(body).await {
                    Ok(payload) => payload,
                    Err(e) => return error_response(&e),
                };
                match state
                    .service
                    .patch_document(&document, payload, &user)
                    .await
                {
                    Ok(()) => no_content(),
                    Err(e) => error_response(&e),
                }
            }
            "DELETE" => match state.service.delete_document(&document, &user).await {
                Ok(()) => no_content(),
                Err(e) => error_response(&e),
            },
            _ => error_response(&ServiceError::bad_request("unsupported method")),
        },
        Target::Collection(collection) => match method.as_str() {
            "GET" => {
                let limit = parse_limit(params.limit.as_deref());
                let order_by = parse_order_by(params.order_by.as_deref());
                match state
                    .service
                    .get_collection(&collection, limit, &order_by, &user)
                    .await
                {
                    Ok(data) => {
                        render(&method, &headers, pretty, &ResponsePayload::Collection(data))
                    }
                    Err(e) => error_response(&e),
                }
            }
            "POST" => {
                let payload: Properties = match decode_body(body).await {
                    Ok(payload) => payload,
                    Err(e) => return error_response(&e),
                };
                match state
                    .service
                    .add_document(&collection, payload, &user)
                    .await
                {
                    Ok(created) => {
                        render(&method, &headers, pretty, &ResponsePayload::Document(created))
                    }
                    Err(e) => error_response(&e),
                }
            }
            "DELETE" => match state.service.delete_collection(&collection, &user).await {
                Ok(()) => no_content(),
                Err(e) => error_response(&e),
            },
            _ => error_response(&ServiceError::bad_request("unsupported method")),
        },
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_parse_limit_clamps_and_defaults() {
        assert_eq!(parse_limit(None), 100);
        assert_eq!(parse_limit(Some("abc")), 100);
        assert_eq!(parse_limit(Some("")), 100);
        assert_eq!(parse_limit(Some("10")), 10);
        assert_eq!(parse_limit(Some("0")), 0);
        assert_eq!(parse_limit(Some("-5")), 0);
        assert_eq!(parse_limit(Some("1000")), 100);
    }

    #[test]
    fn test_parse_order_by_splits_and_drops_empties() {
        assert!(parse_order_by(None).is_empty());
        assert!(parse_order_by(Some("")).is_empty());
        assert_eq!(parse_order_by(Some("k")), vec!["k".to_string()]);
        assert_eq!(
            parse_order_by(Some("k/$id")),
            vec!["k".to_string(), "$id".to_string()]
        );
        assert_eq!(parse_order_by(Some("/k/")), vec!["k".to_string()]);
    }

    #[test]
    fn test_unsupported_methods_are_not_routed() {
        // The dispatch matches on the method token, so extension methods
        // must parse as such.
        let method: axum::http::Method = "GET2".parse().unwrap();
        assert_eq!(method.as_str(), "GET2");
    }
}
