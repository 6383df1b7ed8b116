pub mod association_registry;
pub mod dispatcher;
pub mod inbox_store;
pub mod relay_config;
pub mod relay_server;
pub mod relay_state;
