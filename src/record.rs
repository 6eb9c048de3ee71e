use std::cmp::Reverse;

use alloy::{
    primitives::{Address, B256, BlockHash, BlockNumber, Bytes, TxHash},
    rpc::types::Log,
};

use crate::{ChainClient, RecordSource};

/// One event log, optionally enriched with its block, transaction and receipt.
///
/// Records are immutable once fetched; the merge stage shares them behind `Arc`.
#[derive(Clone, Debug)]
pub struct LogRecord<B, T, R> {
    pub log: Log,
    pub block: Option<B>,
    pub transaction: Option<T>,
    pub receipt: Option<R>,
    pub source: RecordSource,
}

/// The record type produced for a given chain client.
pub type ClientRecord<C> = LogRecord<
    <C as ChainClient>::Block,
    <C as ChainClient>::Transaction,
    <C as ChainClient>::Receipt,
>;

impl<B, T, R> LogRecord<B, T, R> {
    /// Wraps a raw log with no details attached.
    #[must_use]
    pub fn new(log: Log, source: RecordSource) -> Self {
        Self { log, block: None, transaction: None, receipt: None, source }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.log.address()
    }

    /// topic0 of the log.
    #[must_use]
    pub fn event_signature(&self) -> Option<B256> {
        self.log.topics().first().copied()
    }

    /// Indexed arguments (topics after topic0).
    #[must_use]
    pub fn indexed_args(&self) -> &[B256] {
        self.log.topics().get(1..).unwrap_or_default()
    }

    #[must_use]
    pub fn raw_data(&self) -> &Bytes {
        &self.log.data().data
    }

    #[must_use]
    pub fn block_number(&self) -> Option<BlockNumber> {
        self.log.block_number
    }

    #[must_use]
    pub fn block_hash(&self) -> Option<BlockHash> {
        self.log.block_hash
    }

    #[must_use]
    pub fn transaction_hash(&self) -> Option<TxHash> {
        self.log.transaction_hash
    }

    #[must_use]
    pub fn log_index(&self) -> Option<u64> {
        self.log.log_index
    }

    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::of(&self.log)
    }

    /// Position in the merged view: newest block first, then highest log index first.
    #[must_use]
    pub(crate) fn sort_key(&self) -> SortKey {
        SortKey {
            block_number: Reverse(self.block_number().unwrap_or_default()),
            log_index: Reverse(self.log_index().unwrap_or_default()),
            key: self.dedup_key(),
        }
    }
}

/// Identity of a ledger event: two logs with the same transaction, log position and containing
/// block are the same event, whatever their payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub transaction_hash: Option<TxHash>,
    pub log_index: Option<u64>,
    pub block_hash: Option<BlockHash>,
}

impl DedupKey {
    #[must_use]
    pub fn of(log: &Log) -> Self {
        Self {
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
            block_hash: log.block_hash,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct SortKey {
    block_number: Reverse<BlockNumber>,
    log_index: Reverse<u64>,
    key: DedupKey,
}
