// marksync services
// Services provide the sync machinery: diffing, persistence, credentials, settings, the remote exchange and the coordinator.

pub mod credential_store;
pub mod crypto_service;
pub mod diff_engine;
pub mod exchange;
pub mod settings_engine;
pub mod snapshot_store;
pub mod sync_coordinator;
