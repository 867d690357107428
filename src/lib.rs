pub mod boundary;
pub mod cache;
pub mod cart;
pub mod config;
pub mod engine;
pub mod error;
pub mod indexer_client;
pub mod ledger;
pub mod logging;
pub mod notification;
pub mod polling;
pub mod query;
pub mod records;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use cache::RemoteStateCache;
pub use cart::TransactionCart;
pub use config::SyncConfig;
pub use engine::{
    EngineDriver,
    EngineHandle,
    SyncEngine,
};
pub use ledger::TransactionLedger;
pub use notification::NotificationSequencer;
pub use polling::PollScheduler;
