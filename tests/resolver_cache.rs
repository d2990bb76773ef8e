// tests/resolver_cache.rs
//
// Redirect resolver: cache semantics with a scripted follower, and real hop
// following against a local Axum server.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use newswire_ingest::config::{HttpConfig, ResolverConfig};
use newswire_ingest::resolve::{HttpFollower, RedirectFollower, RedirectResolver, StaticFollower};
use newswire_ingest::IngestError;
use shuttle_axum::axum::{response::Redirect, routing::get, Router};

const AGG: &str = "https://news.google.com/rss/articles/CBMiXyz?oc=5";
const DEST: &str = "https://investors.acme.com/news/q3";

#[tokio::test]
async fn repeated_requests_within_ttl_are_hits() {
    let follower = Arc::new(StaticFollower::new().with(AGG, DEST));
    let resolver = RedirectResolver::new(follower.clone(), Duration::from_secs(3600), 100);

    let first = resolver.resolve(AGG).await.expect("resolve");
    assert!(!first.cached);
    assert_eq!(first.final_url, DEST);

    for _ in 0..10 {
        let again = resolver.resolve(AGG).await.expect("resolve");
        assert!(again.cached);
        assert_eq!(again.final_url, DEST);
        assert_eq!(again.resolution_time_ms, 0);
    }

    let stats = resolver.cache_stats();
    assert!(stats.hits >= 9, "hits = {}", stats.hits);
    assert_eq!(stats.size, 1);
    assert_eq!(stats.sample[0].resolved_url, DEST);
    assert_eq!(follower.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_entries_are_resolved_again() {
    let follower = Arc::new(StaticFollower::new().with(AGG, DEST));
    let resolver = RedirectResolver::new(follower.clone(), Duration::from_secs(1), 100);

    assert!(!resolver.resolve(AGG).await.unwrap().cached);
    assert!(resolver.resolve(AGG).await.unwrap().cached);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let after = resolver.resolve(AGG).await.unwrap();
    assert!(!after.cached);
    assert_eq!(after.final_url, DEST);
    assert_eq!(follower.calls.load(Ordering::SeqCst), 2);
}

async fn spawn_redirect_server() -> String {
    let app = Router::new()
        .route("/r1", get(|| async { Redirect::temporary("/r2") }))
        .route("/r2", get(|| async { Redirect::permanent("/final") }))
        .route("/final", get(|| async { "publisher page" }))
        .route("/loop", get(|| async { Redirect::temporary("/loop") }))
        .route("/gone", get(|| async { Redirect::temporary("/missing") }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Redirect::temporary("/final")
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        shuttle_axum::axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn http_follower(max_hops: usize) -> HttpFollower {
    let cfg = ResolverConfig {
        max_hops,
        timeout_ms: 3_000,
        ..ResolverConfig::default()
    };
    HttpFollower::new(&HttpConfig::default(), &cfg).expect("client")
}

#[tokio::test]
async fn http_follower_reaches_terminal_url() {
    let base = spawn_redirect_server().await;
    let out = http_follower(5).follow(&format!("{base}/r1")).await.unwrap();
    assert_eq!(out, format!("{base}/final"));
}

#[tokio::test]
async fn http_follower_maps_loops_and_dead_ends_to_resolution_failures() {
    let base = spawn_redirect_server().await;
    let follower = http_follower(3);

    let looped = follower.follow(&format!("{base}/loop")).await.unwrap_err();
    assert!(matches!(looped, IngestError::ResolutionFailed { .. }), "{looped:?}");

    let dead = follower.follow(&format!("{base}/gone")).await.unwrap_err();
    match dead {
        IngestError::ResolutionFailed { reason, .. } => assert!(reason.contains("404"), "{reason}"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn http_follower_timeouts_are_resolution_failures() {
    let base = spawn_redirect_server().await;
    let cfg = ResolverConfig {
        timeout_ms: 200,
        ..ResolverConfig::default()
    };
    let follower = HttpFollower::new(&HttpConfig::default(), &cfg).expect("client");

    let err = follower.follow(&format!("{base}/slow")).await.unwrap_err();
    match err {
        IngestError::ResolutionFailed { url, reason } => {
            assert_eq!(url, format!("{base}/slow"));
            assert!(reason.contains("timed out after 200ms"), "{reason}");
        }
        other => panic!("unexpected {other:?}"),
    }
}
