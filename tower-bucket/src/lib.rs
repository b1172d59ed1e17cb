//! # Tower Bucket
//!
//! `tower-bucket` runs a [`bucket_limit::Limiter`] (or any other
//! [`bucket_limit::Strategy`] over `str` identities) in front of a
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! Every request is mapped to an identity by a caller supplied function.
//! Admitted requests are forwarded to the inner service, rejected ones fail
//! immediately with [`BucketError::RateLimited`]. Nothing is queued.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`BucketError`], allowing automatic conversion
//!   to HTTP status codes (429, 408, 500).

mod error;
mod layer;
mod service;
mod utils;


pub use error::BucketError;
pub use layer::AdmissionLayer;
pub use service::AdmissionService;
pub use service::ResponseFuture;
pub use utils::ServiceBuilderExt;
pub use utils::make_admission_svc;
