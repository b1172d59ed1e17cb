use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use bucket_limit::Algorithm;
use bucket_limit::Limiter;
use bucket_limit::LimiterConfig;
use bucket_server::ANONYMOUS;
use bucket_server::app;
use bucket_server::identify;
use bucket_server::spawn_sweeper;
use quanta::Clock;
use quanta::Mock;
use serde_json::Value;
use tower::ServiceExt;

fn limiter(algorithm: Algorithm) -> (Arc<Limiter>, Arc<Mock>) {
    let (clock, mock) = Clock::mock();
    let config = LimiterConfig::new(algorithm, 5.0, 1.0).unwrap();
    (Arc::new(Limiter::with_clock(config, clock)), mock)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .map(|value| value.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, retry_after, String::from_utf8(body.to_vec()).unwrap())
}

async fn json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(router, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn it_allows_a_burst_then_rejects() {
    for algorithm in [Algorithm::Token, Algorithm::Leaky] {
        let (limiter, _mock) = limiter(algorithm);
        let router = app(limiter);

        for _ in 0..5 {
            let (status, body) = json(&router, "/api?user=alice").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["message"], "Request allowed");
        }

        let (status, retry_after, body) = get(&router, "/api?user=alice").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(retry_after.as_deref(), Some("1"));
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["error"], "Rate limit exceeded");
    }
}

#[tokio::test]
async fn it_recovers_after_waiting() {
    let (limiter, mock) = limiter(Algorithm::Token);
    let router = app(limiter);

    for _ in 0..5 {
        assert_eq!(json(&router, "/api?user=bob").await.0, StatusCode::OK);
    }
    assert_eq!(
        json(&router, "/api?user=bob").await.0,
        StatusCode::TOO_MANY_REQUESTS
    );

    mock.increment(Duration::from_secs(1));
    assert_eq!(json(&router, "/api?user=bob").await.0, StatusCode::OK);
    assert_eq!(
        json(&router, "/api?user=bob").await.0,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn it_accounts_users_separately() {
    let (limiter, _mock) = limiter(Algorithm::Leaky);
    let router = app(Arc::clone(&limiter));

    for _ in 0..6 {
        let _ = get(&router, "/api?user=a").await;
    }
    assert_eq!(json(&router, "/api?user=b").await.0, StatusCode::OK);

    // Missing and empty users share the anonymous allowance
    for _ in 0..2 {
        assert_eq!(json(&router, "/api").await.0, StatusCode::OK);
        assert_eq!(json(&router, "/api?user=").await.0, StatusCode::OK);
    }
    assert_eq!(limiter.len(), 3);
}

#[tokio::test]
async fn it_reports_the_running_algorithm() {
    let (leaky, _mock) = limiter(Algorithm::Leaky);
    let (status, _, body) = get(&app(leaky), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h3>Rate Limiter is Running (Leaky Bucket)</h3>");

    let (token, _mock) = limiter(Algorithm::Token);
    let (_, _, body) = get(&app(token), "/").await;
    assert!(body.contains("Token Bucket"));
}

#[tokio::test]
async fn the_home_page_is_not_rate_limited() {
    let (limiter, _mock) = limiter(Algorithm::Token);
    let router = app(Arc::clone(&limiter));
    for _ in 0..20 {
        assert_eq!(get(&router, "/").await.0, StatusCode::OK);
    }
    assert!(limiter.is_empty());
}

#[tokio::test]
async fn other_methods_do_not_spend_the_allowance() {
    let (limiter, _mock) = limiter(Algorithm::Leaky);
    let router = app(Arc::clone(&limiter));
    for _ in 0..10 {
        let response = router
            .clone()
            .oneshot(Request::post("/api?user=eve").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
    assert!(limiter.is_empty());

    let (status, body) = json(&router, "/api?user=eve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Request allowed");
}

#[test]
fn it_derives_identities_from_the_query() {
    let request = |uri: &str| Request::get(uri).body(Body::empty()).unwrap();
    assert_eq!(identify(&request("/api?user=carol")), "carol");
    assert_eq!(identify(&request("/api?user=a%20b&x=1")), "a b");
    assert_eq!(identify(&request("/api")), ANONYMOUS);
    assert_eq!(identify(&request("/api?user=")), ANONYMOUS);
}

#[tokio::test]
async fn the_sweeper_forgets_recovered_identities() {
    tokio::time::pause();

    let (limiter, mock) = limiter(Algorithm::Leaky);
    assert!(limiter.allow("dave"));
    mock.increment(Duration::from_secs(5));

    let sweeper = spawn_sweeper(Arc::clone(&limiter), Duration::from_secs(60));
    // The first tick fires immediately; sleeping lets paused time auto-advance
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(limiter.is_empty());
    sweeper.abort();
}
