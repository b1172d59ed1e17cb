//! # bucket-server
//!
//! A small HTTP front end for [`bucket_limit::Limiter`].
//!
//! * `GET /api?user=<id>` answers `200 {"message": "Request allowed"}` while
//!   `<id>` has allowance left and `429 {"error": "Rate limit exceeded"}`
//!   afterwards. Requests without a `user` are accounted as `anonymous`.
//! * `GET /` reports which algorithm is running.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use bucket_limit::Limiter;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_bucket::AdmissionLayer;
use tower_bucket::BucketError;

pub mod config;

/// Identity used for callers that do not say who they are.
pub const ANONYMOUS: &str = "anonymous";

#[derive(Clone)]
struct AppState {
    limiter: Arc<Limiter>,
}

#[derive(Deserialize)]
struct Caller {
    user: Option<String>,
}

/// Derives the rate limiting identity of a request from its `user` query parameter.
pub fn identify(req: &Request) -> String {
    Query::<Caller>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(caller)| caller.user)
        .filter(|user| !user.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

/// Builds the router. The limiter is injected, there is no global instance.
pub fn app(limiter: Arc<Limiter>) -> Router {
    let admission = ServiceBuilder::new()
        // Outermost: turns BoxError back into a response
        .layer(HandleErrorLayer::new(handle_bucket_error))
        .layer(AdmissionLayer::new(Arc::clone(&limiter), identify))
        // Converts the route's Infallible into BoxError for the admission layer
        .map_err(BoxError::from);

    Router::new()
        .route("/api", get(api).route_layer(admission))
        .route("/", get(home))
        .with_state(AppState { limiter })
}

/// Periodically forgets identities whose bucket has fully recovered.
pub fn spawn_sweeper(limiter: Arc<Limiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = limiter.evict_idle();
            tracing::debug!(removed, tracked = limiter.len(), "idle identity sweep");
        }
    })
}

async fn api() -> Json<Value> {
    Json(json!({ "message": "Request allowed" }))
}

async fn home(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<h3>Rate Limiter is Running ({})</h3>",
        state.limiter.algorithm().title()
    ))
}

async fn handle_bucket_error(err: BoxError) -> Response {
    match err.downcast_ref::<BucketError>() {
        Some(bucket_err) => bucket_err.clone().into_response(),
        None => {
            tracing::error!(%err, "unexpected service error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
        }
    }
}
