//! # bucket-limit
//!
//! `bucket-limit` provides per-identity admission control built on two classic
//! bucket algorithms: a refilling [`TokenBucket`] and a draining [`LeakyBucket`].
//!
//! ## Core Philosophy
//!
//! Each engine is a set of immutable parameters plus a pure `evaluate` function
//! over a small `Copy` state value. All mutable state lives in a [`Registry`],
//! a sharded concurrent map that serializes the read-evaluate-write of a single
//! identity while leaving unrelated identities free to proceed in parallel.
//!
//! ## Key Concepts
//!
//! * **Lazy Evaluation**: Tokens and water levels are recalculated at the moment of the
//!   request, there are no background workers or timers.
//! * **Per-Identity Linearizability**: Concurrent calls for the same identity observe each
//!   other's updates. No lost updates, no global lock.
//! * **Clock Tolerance**: Elapsed time is clamped to zero if the clock appears to move
//!   backwards, and stored timestamps never regress.
//!
//! ## Example
//!
//! ```rust
//! use bucket_limit::Algorithm;
//! use bucket_limit::Limiter;
//! use bucket_limit::LimiterConfig;
//!
//! let config = LimiterConfig::new(Algorithm::Token, 5.0, 1.0).unwrap();
//! let limiter: Limiter = Limiter::new(config);
//!
//! for _ in 0..5 {
//!     assert!(limiter.allow("alice"));
//! }
//! assert!(!limiter.allow("alice"));
//! assert!(limiter.allow("bob"));
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod config;
mod keyed;
mod leaky_bucket;
mod limiter;
mod registry;
mod token_bucket;

pub use config::Algorithm;
pub use config::ConfigError;
pub use config::LimiterConfig;
pub use keyed::KeyedLimiter;
pub use leaky_bucket::LeakyBucket;
pub use leaky_bucket::LeakyState;
pub use limiter::Limiter;
pub use registry::Registry;
pub use token_bucket::TokenBucket;
pub use token_bucket::TokenState;

/// Reasons why a request might be rejected.
#[derive(Debug, PartialEq)]
pub enum Reason {
    /// `retry_after` is [`Duration::MAX`] when the request can never be admitted.
    Overloaded { retry_after: Duration },
}

/// A bucket algorithm: immutable parameters plus a pure transition function.
///
/// Engines never own per-identity state. The [`Registry`] hands them the
/// current state of one identity and stores whatever they return.
pub trait Engine: Copy + Debug + Send + Sync {
    /// Per-identity bucket state.
    type State: Copy + Debug + Send + Sync;

    /// The algorithm this engine implements.
    const ALGORITHM: Algorithm;

    /// State of an identity observed for the first time at `now`.
    fn initial(&self, now: u64) -> Self::State;

    /// Decides whether one request arriving at `now` is admitted.
    ///
    /// `now` is in nanoseconds since an arbitrary anchor. A `now` earlier than
    /// the stored timestamp is treated as zero elapsed time.
    fn evaluate(&self, state: Self::State, now: u64) -> (ControlFlow<Reason>, Self::State);

    /// Timestamp of the last update recorded in `state`.
    fn last_update(state: &Self::State) -> u64;

    /// Idle time after which any state is indistinguishable from a fresh one.
    fn recovery(&self) -> Duration;
}

/// The seam between the admission core and whatever invokes it per request.
///
/// Strategies must be `Send` and `Sync` to be shared across request handlers
/// via `Arc`.
pub trait Strategy<Q: ?Sized>: Debug {
    /// Attempts to admit a single request for `identity`.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the identity's rate limit has been reached.
    fn process(&self, identity: &Q) -> ControlFlow<Reason>;

    /// Short name of the underlying algorithm, suitable for metric labels.
    fn name(&self) -> &'static str;
}

pub(crate) const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Converts a wait expressed in (possibly huge) seconds into a `Duration`.
pub(crate) fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
