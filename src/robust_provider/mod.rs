//! Retrying, failing-over [`ChainClient`](crate::ChainClient) over Alloy providers.
//!
//! [`RobustProvider`] wraps one primary [`RootProvider`](alloy::providers::RootProvider) and any
//! number of fallbacks. Each call gets:
//! * a total timeout
//! * exponential backoff retries
//! * failover to the fallbacks in the order they were added
//!
//! Head-advances come from a `newHeads` subscription when a provider supports pubsub, with lag
//! tracking and periodic reconnection to the primary, and from `eth_blockNumber` polling
//! otherwise.
//!
//! Build one with [`RobustProviderBuilder`], or convert an existing provider through
//! [`IntoRobustProvider`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use alloy::providers::ProviderBuilder;
//! use event_history::{ChainClient, robust_provider::RobustProviderBuilder};
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let ws = ProviderBuilder::new().connect("ws://localhost:8545").await?;
//! let ws_fallback = ProviderBuilder::new().connect("ws://localhost:8546").await?;
//!
//! let robust = RobustProviderBuilder::new(ws)
//!     .fallback(ws_fallback)
//!     .call_timeout(Duration::from_secs(30))
//!     .build()
//!     .await?;
//!
//! println!("head: {}", robust.get_block_number().await?);
//!
//! let mut heads = robust.watch_heads().await?;
//! while let Some(head) = heads.next().await {
//!     println!("new head: {head:?}");
//! }
//! # Ok(()) }
//! ```

pub mod builder;
pub mod heads;
pub mod provider;
pub mod provider_conversion;

pub use builder::*;
pub use heads::{
    DEFAULT_HEAD_BUFFER_CAPACITY, DEFAULT_HEAD_POLL_INTERVAL, DEFAULT_RECONNECT_INTERVAL,
};
pub use provider::RobustProvider;
pub use provider_conversion::{IntoRobustProvider, IntoRootProvider};
