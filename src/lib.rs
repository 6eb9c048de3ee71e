//! Event-History keeps a deduplicated, ordered view of one contract event's logs, from a starting
//! block up to the chain head and, optionally, beyond it as new blocks arrive.
//!
//! The entry point is [`subscribe`], which takes a [`ChainClient`] and a [`SyncConfig`] and returns
//! an [`EventHistory`] handle.
//!
//! # Phases
//!
//! A subscription first replays history in windows of at most
//! [`batch_size`](SyncConfigBuilder::batch_size) blocks ([`Phase::Backfilling`]). Once the window
//! reaching the ceiling (the head, or `to_block` when lower) succeeds it is [`Phase::CaughtUp`].
//! With [`watch_live`](SyncConfigBuilder::watch_live) it then moves to [`Phase::Polling`] and
//! fetches the blocks after its cursor on every head-advance.
//!
//! At most one fetch is in flight per subscription. Triggers that arrive while a fetch is running
//! (head-advances, [`EventHistory::refetch`]) are dropped; the next trigger after completion
//! covers the remaining range.
//!
//! # Faults
//!
//! Faults never stop a subscription. A failed window or poll is published on
//! [`EventHistory::error`], the cursor stays where it was and the same range is fetched again on
//! the next trigger.
//!
//! # Ordering and duplicates
//!
//! Records are keyed by `(transaction_hash, log_index, block_hash)`. A key is delivered once; when
//! both a historical and a live copy of an event arrive, the live copy wins. The published list is
//! strictly descending by `(block_number, log_index)`.
//!
//! # Robust providers
//!
//! The [`robust_provider`] module provides [`robust_provider::RobustProvider`], a [`ChainClient`]
//! over Alloy providers that retries, times out and fails over across multiple RPC endpoints.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use alloy::primitives::address;
//! use event_history::{
//!     EventFilter, Phase, SyncConfig,
//!     robust_provider::{RobustProvider, RobustProviderBuilder},
//!     subscribe,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider: RobustProvider = RobustProviderBuilder::new("ws://localhost:8545").build().await?;
//!
//! let filter = EventFilter::new()
//!     .contract_address(address!("0x5FbDB2315678afecb367f032d93F642f64180aa3"))
//!     .event("CountIncreased(uint256)");
//! let config = SyncConfig::builder(filter).watch_live(true).build();
//!
//! let history = subscribe(Arc::new(provider), config);
//! let mut phase = history.phase();
//! phase.wait_for(|phase| *phase == Phase::Polling).await?;
//!
//! for record in history.records().borrow().iter() {
//!     println!("{:?} #{:?}", record.block_number(), record.log_index());
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod logging;

pub mod robust_provider;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod chain;
mod config;
mod engine;
mod error;
mod record;
mod types;

pub use chain::{ChainClient, HeadStream};
pub use config::{
    DEFAULT_BATCH_SIZE, Enrichment, EventFilter, LOCAL_CHAIN_ID, SyncConfig, SyncConfigBuilder,
};
pub use engine::{
    EventHistory, MergeReport, MergeStage, Records, plan_window, subscribe,
};
pub use error::{ConfigFault, QueryFault, SyncError};
pub use record::{ClientRecord, DedupKey, LogRecord};
pub use types::{FetchStatus, Phase, RecordSource};
