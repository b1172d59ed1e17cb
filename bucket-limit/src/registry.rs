use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

use dashmap::DashMap;

/// Owns the state of every identity seen so far.
///
/// Backed by a sharded concurrent map. The read-modify-write performed by
/// [`Registry::with_state`] happens under the write guard of the identity's
/// shard, so calls for one identity are linearizable while identities on
/// other shards are not blocked.
pub struct Registry<K, S>
where
    K: Eq + Hash,
{
    states: DashMap<K, S>,
}

impl<K, S> Registry<K, S>
where
    K: Eq + Hash,
    S: Copy,
{
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Applies `f` to the state of `identity` and stores the state it returns.
    ///
    /// An identity without state is initialised with `init` first. Exclusive
    /// access to the entry is held for the duration of `f`, so `f` must not
    /// call back into this registry.
    pub fn with_state<Q, R>(
        &self,
        identity: &Q,
        init: impl FnOnce() -> S,
        f: impl FnOnce(S) -> (R, S),
    ) -> R
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        // Known identities avoid allocating an owned key.
        if let Some(mut entry) = self.states.get_mut(identity) {
            let (result, next) = f(*entry);
            *entry = next;
            return result;
        }

        let mut entry = self.states.entry(identity.to_owned()).or_insert_with(|| {
            tracing::trace!("tracking new identity");
            init()
        });
        let (result, next) = f(*entry);
        *entry = next;
        result
    }

    /// Current state of `identity`, if it has been seen.
    pub fn get<Q>(&self, identity: &Q) -> Option<S>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.states.get(identity).map(|entry| *entry)
    }

    /// Drops every identity whose state fails `keep`, returning how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&S) -> bool) -> usize {
        let mut removed = 0;
        self.states.retain(|_, state| {
            let kept = keep(state);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<K, S> Default for Registry<K, S>
where
    K: Eq + Hash,
    S: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> fmt::Debug for Registry<K, S>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("identities", &self.states.len())
            .finish()
    }
}
