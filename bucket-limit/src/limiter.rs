use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::ops::ControlFlow;

use quanta::Clock;

use crate::Algorithm;
use crate::KeyedLimiter;
use crate::LeakyBucket;
use crate::LimiterConfig;
use crate::Reason;
use crate::Strategy;
use crate::TokenBucket;

/// The admission facade.
///
/// Binds one engine, chosen once from a [`LimiterConfig`], and answers
/// `allow(identity)` for any number of concurrent callers. Share it with
/// `Arc`; there is no global instance.
pub struct Limiter<K = String>
where
    K: Eq + Hash,
{
    buckets: Buckets<K>,
}

enum Buckets<K>
where
    K: Eq + Hash,
{
    Token(KeyedLimiter<TokenBucket, K>),
    Leaky(KeyedLimiter<LeakyBucket, K>),
}

/// Forwards a call to whichever engine is bound.
macro_rules! dispatch {
    ($self:ident, $limiter:ident => $body:expr) => {
        match &$self.buckets {
            Buckets::Token($limiter) => $body,
            Buckets::Leaky($limiter) => $body,
        }
    };
}

impl<K> Limiter<K>
where
    K: Eq + Hash,
{
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Clock::new())
    }

    pub fn with_clock(config: LimiterConfig, clock: Clock) -> Self {
        let (capacity, rate) = (config.capacity(), config.rate());
        // The config has already been validated, so these cannot fail.
        let buckets = match config.algorithm() {
            Algorithm::Token => Buckets::Token(KeyedLimiter::with_clock(
                TokenBucket::from_validated(capacity, rate),
                clock,
            )),
            Algorithm::Leaky => Buckets::Leaky(KeyedLimiter::with_clock(
                LeakyBucket::from_validated(capacity, rate),
                clock,
            )),
        };
        tracing::info!(
            algorithm = %config.algorithm(),
            capacity,
            rate,
            "rate limiter ready"
        );
        Self { buckets }
    }

    /// Returns `true` if a request for `identity` is admitted.
    pub fn allow<Q>(&self, identity: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.check(identity).is_continue()
    }

    /// Like [`Limiter::allow`], but says how long to wait after a rejection.
    pub fn check<Q>(&self, identity: &Q) -> ControlFlow<Reason>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        dispatch!(self, limiter => limiter.check(identity))
    }

    /// Forgets identities whose bucket has fully recovered.
    ///
    /// Nothing calls this automatically; schedule it if the identity space is
    /// unbounded.
    pub fn evict_idle(&self) -> usize {
        dispatch!(self, limiter => limiter.evict_idle())
    }

    pub fn algorithm(&self) -> Algorithm {
        match &self.buckets {
            Buckets::Token(_) => Algorithm::Token,
            Buckets::Leaky(_) => Algorithm::Leaky,
        }
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        dispatch!(self, limiter => limiter.len())
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, limiter => limiter.is_empty())
    }
}

impl<K> fmt::Debug for Limiter<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, limiter => f.debug_tuple("Limiter").field(limiter).finish())
    }
}

impl<K, Q> Strategy<Q> for Limiter<K>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
{
    fn process(&self, identity: &Q) -> ControlFlow<Reason> {
        self.check(identity)
    }

    fn name(&self) -> &'static str {
        self.algorithm().as_str()
    }
}
