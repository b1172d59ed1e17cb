use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::ops::ControlFlow;

use quanta::Clock;
use quanta::Instant;

use crate::Engine;
use crate::Reason;
use crate::Registry;
use crate::Strategy;

/// One engine bound to its own registry and clock.
///
/// This is the statically dispatched building block behind [`crate::Limiter`].
pub struct KeyedLimiter<E, K>
where
    E: Engine,
    K: Eq + Hash,
{
    engine: E,
    registry: Registry<K, E::State>,
    clock: Clock,
    /// A fixed point in time to calculate deltas from.
    anchor: Instant,
}

impl<E, K> KeyedLimiter<E, K>
where
    E: Engine,
    K: Eq + Hash,
{
    pub fn new(engine: E) -> Self {
        Self::with_clock(engine, Clock::new())
    }

    pub fn with_clock(engine: E, clock: Clock) -> Self {
        let anchor = clock.now();
        Self {
            engine,
            registry: Registry::new(),
            clock,
            anchor,
        }
    }

    /// Attempts to admit one request for `identity`.
    pub fn check<Q>(&self, identity: &Q) -> ControlFlow<Reason>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        // Read outside the entry lock: a racing caller may store a later
        // timestamp first, which the engines absorb as zero elapsed time.
        let now = self.now();
        self.registry.with_state(
            identity,
            || self.engine.initial(now),
            |state| self.engine.evaluate(state, now),
        )
    }

    /// Returns `true` if a request for `identity` is admitted.
    pub fn allow<Q>(&self, identity: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.check(identity).is_continue()
    }

    /// Forgets identities that have been idle long enough to be back at full
    /// capacity. Their next request behaves exactly as if they were kept.
    pub fn evict_idle(&self) -> usize {
        let now = self.now();
        let horizon = self.engine.recovery().as_nanos().min(u64::MAX as u128) as u64;
        let removed = self
            .registry
            .retain(|state| now.saturating_sub(E::last_update(state)) < horizon);
        if removed > 0 {
            tracing::debug!(
                removed,
                algorithm = %E::ALGORITHM,
                "evicted idle identities"
            );
        }
        removed
    }

    /// Snapshot of the state stored for `identity`.
    pub fn state<Q>(&self, identity: &Q) -> Option<E::State>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.registry.get(identity)
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    fn now(&self) -> u64 {
        self.clock.now().duration_since(self.anchor).as_nanos() as u64
    }
}

impl<E, K> fmt::Debug for KeyedLimiter<E, K>
where
    E: Engine,
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLimiter")
            .field("engine", &self.engine)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<E, K, Q> Strategy<Q> for KeyedLimiter<E, K>
where
    E: Engine,
    K: Eq + Hash + Borrow<Q>,
    Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
{
    fn process(&self, identity: &Q) -> ControlFlow<Reason> {
        self.check(identity)
    }

    fn name(&self) -> &'static str {
        E::ALGORITHM.as_str()
    }
}
