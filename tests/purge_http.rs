#![cfg(feature = "http")]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use cache_purge::config::{ProxyConfig, RuleConfig};
use cache_purge::http::{PurgeHttpState, router};
use cache_purge::sched::AbortOnDrop;
use cache_purge::{
    CacheManager, CachedPayload, EntryIdentity, EntryState, PurgeConfig, PurgeStatsSnapshot,
};
use tower::util::ServiceExt;

fn config() -> PurgeConfig {
    PurgeConfig {
        bucket_count: 128,
        shard_count: 8,
        proxies: vec![ProxyConfig {
            id: "web".into(),
            uuid: 1,
            rules: vec![RuleConfig {
                name: "static".into(),
                id: 3,
                enabled: true,
                ttl_seconds: 0,
            }],
        }],
        ..PurgeConfig::default()
    }
}

fn start() -> (Arc<CacheManager>, AbortOnDrop) {
    let (manager, driver) = CacheManager::start(config());
    let manager = Arc::new(manager);
    for (host, path) in [("a.com", "/index.html"), ("a.com", "/app.js"), ("b.com", "/index.html")] {
        manager.table().insert(
            EntryIdentity {
                key: Bytes::from(format!("{host}{path}")),
                proxy_uuid: 1,
                rule_id: 3,
                host: Bytes::copy_from_slice(host.as_bytes()),
                path: Bytes::copy_from_slice(path.as_bytes()),
            },
            Arc::new(CachedPayload::new(
                200,
                vec![("content-type".into(), "text/html".into())],
                Bytes::from(format!("body of {host}{path}")),
            )),
            0,
        );
    }
    (manager, driver)
}

async fn send(
    manager: &Arc<CacheManager>,
    request: Request<Body>,
) -> Result<(StatusCode, axum::http::HeaderMap, Bytes), Box<dyn std::error::Error>> {
    let app = router(PurgeHttpState::new(manager.clone()));
    let response = app.oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, headers, body))
}

#[tokio::test]
async fn cached_entries_are_served_until_purged() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();

    let get = || {
        Request::builder()
            .method("GET")
            .uri("/index.html")
            .header("host", "a.com")
            .body(Body::empty())
    };
    let (status, headers, body) = send(&manager, get()?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/html");
    assert_eq!(&body[..], b"body of a.com/index.html");

    let purge = Request::builder()
        .method("PURGE")
        .uri("/index.html")
        .header("host", "a.com")
        .body(Body::empty())?;
    let (status, headers, body) = send(&manager, purge).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(&body[..], b"OK\n");

    let (status, _, _) = send(&manager, get()?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        manager.table().state_of(b"a.com/index.html"),
        Some(EntryState::Expired)
    );
    Ok(())
}

#[tokio::test]
async fn purging_a_missing_key_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();
    let purge = Request::builder()
        .method("PURGE")
        .uri("/nope")
        .header("host", "a.com")
        .body(Body::empty())?;
    let (status, _, body) = send(&manager, purge).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(&body[..], b"Not Found\n");
    assert_eq!(manager.table().count_in_state(EntryState::Valid), 3);
    Ok(())
}

#[tokio::test]
async fn host_sweep_replies_after_completion() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();
    let purge = Request::builder()
        .method("PURGE")
        .uri("/cache/manager")
        .header("x-host", "a.com")
        .body(Body::empty())?;
    let (status, _, body) = send(&manager, purge).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK\n");
    assert_eq!(manager.table().count_in_state(EntryState::Invalid), 2);
    assert_eq!(
        manager.table().state_of(b"b.com/index.html"),
        Some(EntryState::Valid)
    );
    Ok(())
}

#[tokio::test]
async fn manager_rejects_unusable_requests() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();

    let empty = Request::builder()
        .method("PURGE")
        .uri("/cache/manager")
        .body(Body::empty())?;
    let (status, _, body) = send(&manager, empty).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&body[..], b"Bad request\n");

    let bad_regex = Request::builder()
        .method("PURGE")
        .uri("/cache/manager")
        .header("regex", "[")
        .body(Body::empty())?;
    let (status, _, _) = send(&manager, bad_regex).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = Request::builder()
        .method("PURGE")
        .uri("/cache/manager")
        .header("name", "missing")
        .body(Body::empty())?;
    let (status, _, _) = send(&manager, unknown).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(manager.table().count_in_state(EntryState::Valid), 3);
    assert_eq!(manager.pool().used(), 0);
    Ok(())
}

#[tokio::test]
async fn post_updates_rule_state_and_ttl() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();
    let post = Request::builder()
        .method("POST")
        .uri("/cache/manager")
        .header("name", "web")
        .header("state", "disable")
        .header("ttl", "1h")
        .body(Body::empty())?;
    let (status, _, _) = send(&manager, post).await?;
    assert_eq!(status, StatusCode::OK);

    let rule = manager
        .registry()
        .find_rule(b"static")
        .ok_or("rule missing")?;
    assert!(!rule.is_enabled());
    assert_eq!(rule.ttl_seconds(), 3600);
    Ok(())
}

#[tokio::test]
async fn metrics_report_purge_counters() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();
    let purge = Request::builder()
        .method("PURGE")
        .uri("/app.js")
        .header("host", "a.com")
        .body(Body::empty())?;
    send(&manager, purge).await?;

    let metrics = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())?;
    let (status, _, body) = send(&manager, metrics).await?;
    assert_eq!(status, StatusCode::OK);
    let snapshot: PurgeStatsSnapshot = serde_json::from_slice(&body)?;
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.key_purges, 1);
    Ok(())
}

#[tokio::test]
async fn put_stores_a_body_that_get_serves_until_purged() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();

    let put = Request::builder()
        .method("PUT")
        .uri("/style.css?v=2")
        .header("host", "c.com")
        .header("name", "static")
        .header("content-type", "text/css")
        .body(Body::from("body { margin: 0 }"))?;
    let (status, _, body) = send(&manager, put).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"OK\n");

    let get = || {
        Request::builder()
            .method("GET")
            .uri("/style.css?v=2")
            .header("host", "c.com")
            .body(Body::empty())
    };
    let (status, headers, body) = send(&manager, get()?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/css");
    assert_eq!(&body[..], b"body { margin: 0 }");

    let purge = Request::builder()
        .method("PURGE")
        .uri("/cache/manager")
        .header("x-host", "c.com")
        .body(Body::empty())?;
    let (status, _, _) = send(&manager, purge).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&manager, get()?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(manager.stats().stored, 1);
    Ok(())
}

#[tokio::test]
async fn put_without_a_known_rule_stores_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let (manager, _driver) = start();

    let unnamed = Request::builder()
        .method("PUT")
        .uri("/x")
        .header("host", "c.com")
        .body(Body::from("x"))?;
    let (status, _, _) = send(&manager, unnamed).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = Request::builder()
        .method("PUT")
        .uri("/x")
        .header("host", "c.com")
        .header("name", "missing")
        .body(Body::from("x"))?;
    let (status, _, _) = send(&manager, unknown).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(manager.table().len(), 3);
    Ok(())
}
