use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tokio::time::Timeout;
use tokio::time::timeout;
use tower::BoxError;
use tower::Service;

use bucket_limit::Reason;
use bucket_limit::Strategy;

use crate::error::BucketError;

#[derive(Clone, Debug)]
struct AdmissionServiceMetrics {
    admitted: Counter<u64>,
    rejected: Counter<u64>,
}

pub struct AdmissionService<L, F, S>
where
    L: ?Sized,
{
    inner: S,
    limiter: Arc<L>,
    identify: F,
    timeout: Option<Duration>,
    instruments: AdmissionServiceMetrics,
}

pin_project! {
    /// Either the inner service future or an immediate rejection.
    pub struct ResponseFuture<F> {
        #[pin]
        kind: Kind<F>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<F> {
        Admitted {
            #[pin]
            inner: F,
        },
        Bounded {
            #[pin]
            inner: Timeout<F>,
        },
        Rejected {
            error: Option<BucketError>,
        },
    }
}

impl<F: Future> ResponseFuture<F> {
    fn admitted(inner: F, limit: Option<Duration>) -> Self {
        let kind = match limit {
            Some(limit) => Kind::Bounded {
                inner: timeout(limit, inner),
            },
            None => Kind::Admitted { inner },
        };
        Self { kind }
    }

    fn rejected(error: BucketError) -> Self {
        Self {
            kind: Kind::Rejected { error: Some(error) },
        }
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<BoxError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::Admitted { inner } => inner.poll(cx),
            KindProj::Bounded { inner } => match inner.poll(cx) {
                Poll::Ready(Ok(res)) => Poll::Ready(res),
                Poll::Ready(Err(_)) => {
                    Poll::Ready(Err(E::from(BoxError::from(BucketError::Timeout))))
                }
                Poll::Pending => Poll::Pending,
            },
            KindProj::Rejected { error } => {
                let error = error
                    .take()
                    .unwrap_or_else(|| BucketError::Inner("polled after completion".to_string()));
                Poll::Ready(Err(E::from(BoxError::from(error))))
            }
        }
    }
}

impl<F> fmt::Debug for ResponseFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseFuture")
    }
}

impl<L, F, S> Clone for AdmissionService<L, F, S>
where
    L: ?Sized,
    F: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            identify: self.identify.clone(),
            timeout: self.timeout,
            instruments: self.instruments.clone(),
        }
    }
}

impl<L, F, S> fmt::Debug for AdmissionService<L, F, S>
where
    L: fmt::Debug + ?Sized,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionService")
            .field("inner", &self.inner)
            .field("limiter", &self.limiter)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<L, F, S, Req> Service<Req> for AdmissionService<L, F, S>
where
    L: Strategy<str> + ?Sized,
    F: Fn(&Req) -> String,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Admission is decided per request in `call`, once the identity is known.
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let identity = (self.identify)(&req);
        let labels = [KeyValue::new("algorithm", self.limiter.name())];

        match self.limiter.process(identity.as_str()) {
            ControlFlow::Continue(()) => {
                self.instruments.admitted.add(1, &labels);
                ResponseFuture::admitted(self.inner.call(req), self.timeout)
            }
            ControlFlow::Break(Reason::Overloaded { retry_after }) => {
                self.instruments.rejected.add(1, &labels);
                tracing::trace!(%identity, ?retry_after, "request rejected");
                ResponseFuture::rejected(BucketError::RateLimited { retry_after })
            }
        }
    }
}

impl<L, F, S> AdmissionService<L, F, S>
where
    L: ?Sized,
{
    pub fn new(inner: S, limiter: Arc<L>, identify: F) -> Self {
        let meter = global::meter("admission_service");
        let instruments = AdmissionServiceMetrics {
            admitted: meter.u64_counter("admitted_requests").build(),
            rejected: meter.u64_counter("rejected_requests").build(),
        };

        Self {
            inner,
            limiter,
            identify,
            timeout: None,
            instruments,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
