use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::frame::frame_model::ClientId;

#[derive(Default)]
struct Associations {
    last_seen: FxHashMap<ClientId, Instant>,
    /// the same entries as `last_seen`, ordered from least to most recently renewed
    by_recency: BTreeSet<(Instant, ClientId)>,
}
impl Associations {
    fn insert(&mut self, client_id: &ClientId, now: Instant) {
        if let Some(prev) = self.last_seen.insert(client_id.clone(), now) {
            self.by_recency.remove(&(prev, client_id.clone()));
        }
        self.by_recency.insert((now, client_id.clone()));
    }

    fn evict_oldest(&mut self) -> Option<(Instant, ClientId)> {
        let (t, client_id) = self.by_recency.pop_first()?;
        self.last_seen.remove(&client_id);
        Some((t, client_id))
    }

    fn oldest(&self) -> Option<Instant> {
        self.by_recency.first()
            .map(|(t, _)| *t)
    }
}

/// Keeps track of which clients are associated, and when they last renewed their association.
///
/// Staleness is decided when an association is used rather than by some background cleanup: an
///  association is live for `timeout` after its last renewal, and the registry is agnostic of the
///  concrete timeout.
///
/// Entries are additionally indexed by renewal time, so making room at capacity takes logarithmic
///  time regardless of the registry's size.
pub struct AssociationRegistry {
    max_associations: Option<usize>,
    associations: Mutex<Associations>,
}
impl AssociationRegistry {
    pub fn new(max_associations: Option<usize>) -> AssociationRegistry {
        AssociationRegistry {
            max_associations,
            associations: Default::default(),
        }
    }

    fn associations(&self) -> MutexGuard<'_, Associations> {
        self.associations.lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates or renews a client's association. This always succeeds.
    ///
    /// If the registry is at capacity and the client is not yet registered, the association that
    ///  was renewed least recently is evicted. If there are stale associations, that is one of them.
    pub fn associate(&self, client_id: &ClientId, now: Instant) {
        let mut associations = self.associations();

        if let Some(max_associations) = self.max_associations {
            if associations.last_seen.len() >= max_associations && !associations.last_seen.contains_key(client_id) {
                if let Some((t, evicted)) = associations.evict_oldest() {
                    debug!("association registry at capacity: evicting {}, last seen {:?} ago", evicted, now.saturating_duration_since(t));
                }
            }
        }

        associations.insert(client_id, now);
    }

    pub fn is_live(&self, client_id: &ClientId, now: Instant, timeout: Duration) -> bool {
        self.associations()
            .last_seen
            .get(client_id)
            .map(|&t| Self::is_fresh(t, now, timeout))
            .unwrap_or(false)
    }

    /// Removes all stale associations, returning the number of removed entries
    pub fn evict_stale(&self, now: Instant, timeout: Duration) -> usize {
        let mut associations = self.associations();

        let mut num_evicted = 0;
        while let Some(t) = associations.oldest() {
            if Self::is_fresh(t, now, timeout) {
                break;
            }
            associations.evict_oldest();
            num_evicted += 1;
        }
        num_evicted
    }

    pub fn len(&self) -> usize {
        self.associations().last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.associations().last_seen.is_empty()
    }

    fn is_fresh(last_seen: Instant, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(last_seen) <= timeout
    }
}
