//! axum front end: purge and management requests go to the [`CacheManager`],
//! `PUT` fills the cache table, and `GET`/`HEAD` are answered from it.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use serde::Serialize;

use crate::manager::{CacheManager, ManagerRequest};
use crate::observability::PurgeStatsSnapshot;
use crate::purge::build_purge_key;
use crate::reply::PurgeReply;

const FORWARDED_HEADERS: [&str; 7] = ["host", "name", "x-host", "path", "regex", "state", "ttl"];

#[derive(Clone)]
pub struct PurgeHttpState {
    manager: Arc<CacheManager>,
}

impl PurgeHttpState {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    entries: usize,
}

pub fn router(state: PurgeHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback(handle_request)
        .with_state(state)
}

async fn health(State(state): State<PurgeHttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        entries: state.manager.table().len(),
    })
}

async fn metrics(State(state): State<PurgeHttpState>) -> Json<PurgeStatsSnapshot> {
    Json(state.manager.stats())
}

async fn handle_request(State(state): State<PurgeHttpState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let manager_request = manager_request(&parts.method, &parts.uri, &parts.headers);
    if let Some(reply) = state.manager.handle_and_wait(&manager_request).await {
        return reply.into_response();
    }
    if parts.method == Method::PUT {
        return store(&state.manager, &parts.headers, &manager_request, body).await;
    }
    serve_cached(&state.manager, &parts.method, &manager_request)
}

/// Stores the request body under `host + uri` for the rule named by the
/// `name` header, keeping the request's content type.
async fn store(
    manager: &CacheManager,
    headers: &HeaderMap,
    request: &ManagerRequest,
    body: Body,
) -> Response {
    let body = match to_bytes(body, manager.config().max_store_bytes).await {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(error = %err, "cache store body rejected");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };
    let stored_headers = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| vec![(CONTENT_TYPE.as_str().to_string(), value.to_string())])
        .unwrap_or_default();
    match manager.store(request, StatusCode::OK.as_u16(), stored_headers, body) {
        Ok(_) => PurgeReply::Ok.into_response(),
        Err(err) => err.reply().into_response(),
    }
}

fn manager_request(method: &Method, uri: &axum::http::Uri, headers: &HeaderMap) -> ManagerRequest {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut out = ManagerRequest::new(method.as_str(), Bytes::copy_from_slice(path_and_query.as_bytes()));
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(name) {
            out = out.with_header(name, Bytes::copy_from_slice(value.as_bytes()));
        }
    }
    out
}

fn serve_cached(manager: &CacheManager, method: &Method, request: &ManagerRequest) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let Ok(key) = build_purge_key(request.host.as_deref(), &request.uri) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let now = manager.clock().now_epoch_seconds();
    let Some(payload) = manager.table().get(&key, now) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let status = StatusCode::from_u16(payload.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(payload.body.clone()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &payload.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) else {
            tracing::debug!(header = %name, "skipping unrepresentable cached header");
            continue;
        };
        headers.append(name, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_request_keeps_query_and_known_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("example.com"));
        headers.insert("x-host", HeaderValue::from_static("a.com"));
        headers.insert("ttl", HeaderValue::from_static("5m"));
        headers.insert("accept", HeaderValue::from_static("*/*"));
        let uri: axum::http::Uri = "/a/b?c=1".parse().unwrap();

        let request = manager_request(&Method::GET, &uri, &headers);
        assert_eq!(&request.uri[..], b"/a/b?c=1");
        assert_eq!(request.host.as_deref(), Some(&b"example.com"[..]));
        assert_eq!(request.attrs.host.as_deref(), Some(&b"a.com"[..]));
        assert_eq!(request.ttl.as_deref(), Some(&b"5m"[..]));
        assert!(request.attrs.name.is_none());
    }
}
