//! Subscription configuration.
//!
//! A [`SyncConfig`] is immutable once a subscription starts. Build one with
//! [`SyncConfig::builder`]:
//!
//! ```rust
//! use alloy::primitives::address;
//! use event_history::{EventFilter, SyncConfig};
//!
//! let filter = EventFilter::new()
//!     .contract_address(address!("0xd8dA6BF26964af9d7eed9e03e53415d37aa96045"))
//!     .event("Transfer(address,address,uint256)");
//!
//! let config = SyncConfig::builder(filter)
//!     .from_block(19_000_000)
//!     .batch_size(1_000)
//!     .receipt_data(true)
//!     .watch_live(true)
//!     .build();
//!
//! assert_eq!(config.from_block(), 19_000_000);
//! ```

use std::fmt;

use alloy::{
    primitives::{Address, B256, BlockNumber, keccak256},
    rpc::types::{Filter, Log},
};

use crate::ConfigFault;

/// Default number of blocks requested per historical window.
pub const DEFAULT_BATCH_SIZE: u64 = 500;

/// Chain id of local development nodes (anvil, hardhat).
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Selects the logs of one event emitted by one contract.
///
/// Indexed arguments are matched by topic position: `topic1` is the first indexed argument. Each
/// position accepts any of the values added for it; a position with no values matches anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    contract_address: Option<Address>,
    event_signature: Option<B256>,
    indexed_args: [Vec<B256>; 3],
}

impl EventFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the emitting contract.
    #[must_use]
    pub fn contract_address(mut self, address: impl Into<Address>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    /// Sets the event by its canonical signature, e.g. `"Transfer(address,address,uint256)"`.
    #[must_use]
    pub fn event(self, signature: &str) -> Self {
        self.event_signature(keccak256(signature.as_bytes()))
    }

    /// Sets the event by its topic0 hash.
    #[must_use]
    pub fn event_signature(mut self, topic0: B256) -> Self {
        self.event_signature = Some(topic0);
        self
    }

    /// Accepts `value` for the first indexed argument.
    #[must_use]
    pub fn topic1(self, value: impl Into<B256>) -> Self {
        self.indexed_arg(0, value.into())
    }

    /// Accepts `value` for the second indexed argument.
    #[must_use]
    pub fn topic2(self, value: impl Into<B256>) -> Self {
        self.indexed_arg(1, value.into())
    }

    /// Accepts `value` for the third indexed argument.
    #[must_use]
    pub fn topic3(self, value: impl Into<B256>) -> Self {
        self.indexed_arg(2, value.into())
    }

    fn indexed_arg(mut self, position: usize, value: B256) -> Self {
        let accepted = &mut self.indexed_args[position];
        if !accepted.contains(&value) {
            accepted.push(value);
        }
        self
    }

    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.contract_address
    }

    #[must_use]
    pub fn signature(&self) -> Option<B256> {
        self.event_signature
    }

    /// Accepted values per indexed-argument position.
    #[must_use]
    pub fn indexed_args(&self) -> &[Vec<B256>; 3] {
        &self.indexed_args
    }

    /// Whether `log` was emitted by the filtered contract and event, with matching indexed
    /// arguments.
    #[must_use]
    pub fn matches(&self, log: &Log) -> bool {
        if self.contract_address.is_some_and(|address| address != log.address()) {
            return false;
        }
        let topics = log.topics();
        if self.event_signature.is_some_and(|sig| topics.first() != Some(&sig)) {
            return false;
        }
        self.indexed_args.iter().enumerate().all(|(position, accepted)| {
            accepted.is_empty() || topics.get(position + 1).is_some_and(|t| accepted.contains(t))
        })
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigFault> {
        match self.contract_address {
            None => return Err(ConfigFault::MissingContractAddress),
            Some(address) if address.is_zero() => return Err(ConfigFault::ZeroContractAddress),
            Some(_) => {}
        }
        if self.event_signature.is_none() {
            return Err(ConfigFault::MissingEventSignature);
        }
        Ok(())
    }
}

impl From<&EventFilter> for Filter {
    fn from(filter: &EventFilter) -> Self {
        let mut log_filter = Filter::new();
        if let Some(address) = filter.contract_address {
            log_filter = log_filter.address(address);
        }
        if let Some(signature) = filter.event_signature {
            log_filter = log_filter.event_signature(signature);
        }
        let [first, second, third] = &filter.indexed_args;
        if !first.is_empty() {
            log_filter = log_filter.topic1(first.clone());
        }
        if !second.is_empty() {
            log_filter = log_filter.topic2(second.clone());
        }
        if !third.is_empty() {
            log_filter = log_filter.topic3(third.clone());
        }
        log_filter
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contract_address, self.event_signature) {
            (Some(address), Some(signature)) => write!(f, "{address}:{signature}"),
            (Some(address), None) => write!(f, "{address}:*"),
            (None, Some(signature)) => write!(f, "*:{signature}"),
            (None, None) => f.write_str("*:*"),
        }
    }
}

/// Which details are fetched alongside every log.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub block: bool,
    pub transaction: bool,
    pub receipt: bool,
}

impl Enrichment {
    #[must_use]
    pub fn any(self) -> bool {
        self.block || self.transaction || self.receipt
    }
}

/// Parameters of one history subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub(crate) from_block: BlockNumber,
    pub(crate) to_block: Option<BlockNumber>,
    pub(crate) chain_id: u64,
    pub(crate) filter: EventFilter,
    pub(crate) batch_size: u64,
    pub(crate) enrichment: Enrichment,
    pub(crate) watch_live: bool,
    pub(crate) enabled: bool,
}

impl SyncConfig {
    #[must_use]
    pub fn builder(filter: EventFilter) -> SyncConfigBuilder {
        SyncConfigBuilder::new(filter)
    }

    #[must_use]
    pub fn from_block(&self) -> BlockNumber {
        self.from_block
    }

    #[must_use]
    pub fn to_block(&self) -> Option<BlockNumber> {
        self.to_block
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    #[must_use]
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    #[must_use]
    pub fn enrichment(&self) -> Enrichment {
        self.enrichment
    }

    #[must_use]
    pub fn watch_live(&self) -> bool {
        self.watch_live
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Highest block worth fetching when the chain head is at `head`.
    #[must_use]
    pub fn ceiling(&self, head: BlockNumber) -> BlockNumber {
        self.to_block.map_or(head, |to| to.min(head))
    }

    /// Checks the configuration before a subscription starts.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigFault`] found.
    pub fn validate(&self) -> Result<(), ConfigFault> {
        self.filter.validate()?;
        if self.batch_size == 0 {
            return Err(ConfigFault::InvalidBatchSize);
        }
        if let Some(to) = self.to_block &&
            self.from_block > to
        {
            return Err(ConfigFault::InvertedRange { from: self.from_block, to });
        }
        Ok(())
    }
}

/// Builder for [`SyncConfig`].
#[derive(Clone, Debug)]
pub struct SyncConfigBuilder {
    filter: EventFilter,
    from_block: Option<BlockNumber>,
    deployed_at: Option<BlockNumber>,
    to_block: Option<BlockNumber>,
    chain_id: u64,
    batch_size: u64,
    enrichment: Enrichment,
    watch_live: bool,
    enabled: bool,
}

impl SyncConfigBuilder {
    #[must_use]
    pub fn new(filter: EventFilter) -> Self {
        Self {
            filter,
            from_block: None,
            deployed_at: None,
            to_block: None,
            chain_id: LOCAL_CHAIN_ID,
            batch_size: DEFAULT_BATCH_SIZE,
            enrichment: Enrichment::default(),
            watch_live: false,
            enabled: true,
        }
    }

    /// First block to replay. Takes precedence over [`deployed_at`](Self::deployed_at).
    #[must_use]
    pub fn from_block(mut self, block: BlockNumber) -> Self {
        self.from_block = Some(block);
        self
    }

    /// Block the contract was deployed in, used as the start when no `from_block` is set.
    #[must_use]
    pub fn deployed_at(mut self, block: BlockNumber) -> Self {
        self.deployed_at = Some(block);
        self
    }

    /// Last block to include, inclusive. Unbounded by default.
    #[must_use]
    pub fn to_block(mut self, block: BlockNumber) -> Self {
        self.to_block = Some(block);
        self
    }

    #[must_use]
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the number of blocks requested per historical window.
    ///
    /// Must be greater than 0.
    #[must_use]
    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fetch the containing block for every log.
    #[must_use]
    pub fn block_data(mut self, enabled: bool) -> Self {
        self.enrichment.block = enabled;
        self
    }

    /// Fetch the emitting transaction for every log.
    #[must_use]
    pub fn transaction_data(mut self, enabled: bool) -> Self {
        self.enrichment.transaction = enabled;
        self
    }

    /// Fetch the transaction receipt for every log.
    #[must_use]
    pub fn receipt_data(mut self, enabled: bool) -> Self {
        self.enrichment.receipt = enabled;
        self
    }

    /// Keep following the chain head after the backfill catches up.
    #[must_use]
    pub fn watch_live(mut self, enabled: bool) -> Self {
        self.watch_live = enabled;
        self
    }

    /// A disabled subscription never leaves [`Phase::Init`](crate::Phase::Init).
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> SyncConfig {
        SyncConfig {
            from_block: self.from_block.or(self.deployed_at).unwrap_or_default(),
            to_block: self.to_block,
            chain_id: self.chain_id,
            filter: self.filter,
            batch_size: self.batch_size,
            enrichment: self.enrichment,
            watch_live: self.watch_live,
            enabled: self.enabled,
        }
    }
}
