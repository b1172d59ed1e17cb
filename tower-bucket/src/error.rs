/// Errors produced by the admission middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BucketError {
    /// The identity has used up its allowance.
    ///
    /// The duration indicates when the client should retry.
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Rate limit exceeded; retry after {retry_after:?}")]
    RateLimited {
        /// The duration to wait before retrying.
        retry_after: std::time::Duration,
    },

    /// The admitted request took longer than the configured timeout.
    ///
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out")]
    Timeout,

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for BucketError {
    fn into_response(self) -> axum::response::Response {
        use http::StatusCode;
        use http::header::RETRY_AFTER;

        let (status, message, retry_after) = match &self {
            Self::RateLimited { retry_after } => {
                // Whole seconds, rounded up, never zero. No header if waiting cannot help.
                let secs = (*retry_after != std::time::Duration::MAX).then(|| {
                    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                    secs.max(1)
                });
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Rate limit exceeded".to_string(),
                    secs,
                )
            }
            Self::Timeout => (StatusCode::REQUEST_TIMEOUT, self.to_string(), None),
            Self::Inner(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None),
        };

        let body = axum::Json(serde_json::json!({ "error": message }));
        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, http::HeaderValue::from(secs));
        }
        response
    }
}
