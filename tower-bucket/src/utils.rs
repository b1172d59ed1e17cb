use std::sync::Arc;
use std::time::Duration;

use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::layer::util::Stack;
use tower::util::BoxCloneSyncService;

use bucket_limit::Strategy;

use crate::AdmissionLayer;

/// Per-identity admission with a bound on the time spent in the inner service.
pub fn make_admission_svc<L, F, V, Req, Resp>(
    limiter: Arc<L>,
    identify: F,
    timeout: Duration,
    svc: V,
) -> BoxCloneSyncService<Req, Resp, BoxError>
where
    L: Strategy<str> + ?Sized + Send + Sync + 'static,
    F: Fn(&Req) -> String + Clone + Send + Sync + 'static,
    Req: Send + 'static,
    V: Service<Req, Response = Resp, Error = BoxError> + Clone + Send + Sync + 'static,
    <V as Service<Req>>::Future: Send + 'static,
    Resp: 'static,
{
    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(AdmissionLayer::new(limiter, identify).with_timeout(timeout))
            .service(svc),
    )
}

/// Service Builder Extension with additional useful functions for tower::ServiceBuilder.
pub trait ServiceBuilderExt<L> {
    /// Add a per-identity admission layer
    fn admission<F>(
        self,
        limiter: Arc<dyn Strategy<str> + Send + Sync + 'static>,
        identify: F,
    ) -> ServiceBuilder<Stack<AdmissionLayer<dyn Strategy<str> + Send + Sync + 'static, F>, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn admission<F>(
        self,
        limiter: Arc<dyn Strategy<str> + Send + Sync + 'static>,
        identify: F,
    ) -> ServiceBuilder<Stack<AdmissionLayer<dyn Strategy<str> + Send + Sync + 'static, F>, L>>
    {
        self.layer(AdmissionLayer::new(limiter, identify))
    }
}
