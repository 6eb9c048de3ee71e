use std::{mem::discriminant, sync::Arc};

use alloy::{
    eips::BlockId,
    primitives::{BlockNumber, TxHash},
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

/// Faults surfaced by a history subscription.
///
/// Every variant is non-fatal: a published fault leaves the cursor and the merged records as they
/// were, and the subscription keeps accepting triggers afterwards.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// A ledger query failed. The affected window or poll range is retried on the next trigger.
    #[error(transparent)]
    Query(#[from] QueryFault),

    /// The subscription configuration was rejected. The subscription stays in
    /// [`Phase::Init`](crate::Phase::Init).
    #[error(transparent)]
    Config(#[from] ConfigFault),

    /// The subscription was torn down while a fetch was in flight.
    ///
    /// Produced internally when a late result is discarded; never published to consumers.
    #[error("Subscription torn down while a fetch was in flight")]
    Cancelled,
}

impl SyncError {
    /// Whether the failed operation is re-issued by the next head-advance or `refetch()`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Query(_))
    }
}

/// A transient failure talking to the ledger.
#[derive(Error, Debug, Clone)]
pub enum QueryFault {
    /// The underlying RPC transport returned an error.
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),

    /// A timeout elapsed while waiting for an RPC response.
    #[error("Operation timed out")]
    Timeout,

    /// A requested block could not be retrieved.
    #[error("Block not found, Block Id: {0}")]
    BlockNotFound(BlockId),

    /// A requested transaction could not be retrieved.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TxHash),

    /// A requested transaction receipt could not be retrieved.
    #[error("Receipt not found for transaction {0}")]
    ReceiptNotFound(TxHash),

    /// The head-advance subscription ended.
    #[error("Head subscription closed")]
    SubscriptionClosed,
}

impl From<RpcError<TransportErrorKind>> for QueryFault {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        QueryFault::RpcError(Arc::new(error))
    }
}

impl From<tokio::time::error::Elapsed> for QueryFault {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        QueryFault::Timeout
    }
}

/// The subscription configuration cannot be used as given.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigFault {
    /// The event filter names no contract address.
    #[error("Event filter has no contract address")]
    MissingContractAddress,

    /// The event filter names the zero address as its contract.
    #[error("Event filter contract address is the zero address")]
    ZeroContractAddress,

    /// The event filter names no event signature.
    #[error("Event filter has no event signature")]
    MissingEventSignature,

    /// The configured batch size is invalid (must be greater than zero).
    #[error("Batch size must be greater than 0")]
    InvalidBatchSize,

    /// The configured range is inverted.
    #[error("from_block {from} exceeds to_block {to}")]
    InvertedRange { from: BlockNumber, to: BlockNumber },
}

impl PartialEq for SyncError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SyncError::Config(a), SyncError::Config(b)) => a == b,
            (SyncError::Query(a), SyncError::Query(b)) => discriminant(a) == discriminant(b),
            (SyncError::Cancelled, SyncError::Cancelled) => true,
            _ => false,
        }
    }
}
