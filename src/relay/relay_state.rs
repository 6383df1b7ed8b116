use crate::relay::association_registry::AssociationRegistry;
use crate::relay::inbox_store::InboxStore;
use crate::relay::relay_config::RelayConfig;

/// This is where the relay's mutable state lives: the tables shared between all requests. Each
///  table does its own locking.
pub struct RelayState {
    pub registry: AssociationRegistry,
    pub inboxes: InboxStore,
}
impl RelayState {
    pub fn new(config: &RelayConfig) -> RelayState {
        RelayState {
            registry: AssociationRegistry::new(config.max_associations),
            inboxes: InboxStore::new(config.max_buffer_size),
        }
    }
}
