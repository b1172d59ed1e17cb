use std::sync::Arc;
use std::time::Duration;

use tower::Layer;

use crate::service::AdmissionService;

/// Applies per-identity admission control to requests.
///
/// `identify` maps each request to the identity whose allowance it spends.
#[derive(Debug)]
pub struct AdmissionLayer<L, F>
where
    L: ?Sized,
{
    limiter: Arc<L>,
    identify: F,
    timeout: Option<Duration>,
}

impl<L, F> Clone for AdmissionLayer<L, F>
where
    L: ?Sized,
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            identify: self.identify.clone(),
            timeout: self.timeout,
        }
    }
}

impl<L, F> AdmissionLayer<L, F>
where
    L: ?Sized,
{
    /// Create an AdmissionLayer
    pub fn new(limiter: Arc<L>, identify: F) -> Self {
        AdmissionLayer {
            limiter,
            identify,
            timeout: None,
        }
    }

    /// Bound the execution time of admitted requests.
    ///
    /// If the inner service takes longer than this duration, the service
    /// will return `BucketError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<L, F, S> Layer<S> for AdmissionLayer<L, F>
where
    L: ?Sized,
    F: Clone,
{
    type Service = AdmissionService<L, F, S>;

    fn layer(&self, service: S) -> Self::Service {
        let svc = AdmissionService::new(service, self.limiter.clone(), self.identify.clone());
        match self.timeout {
            Some(timeout) => svc.with_timeout(timeout),
            None => svc,
        }
    }
}
