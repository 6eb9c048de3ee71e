//! The ledger primitives the engine consumes.
//!
//! The engine never constructs or caches a client on its own: every subscription receives its
//! [`ChainClient`] explicitly. [`RobustProvider`](crate::robust_provider::RobustProvider)
//! implements the trait over Alloy providers; tests use the scripted client from `test_utils`.

use std::{fmt::Debug, ops::RangeInclusive, pin::Pin};

use alloy::{
    primitives::{BlockHash, BlockNumber, TxHash},
    rpc::types::Log,
};
use tokio_stream::Stream;

use crate::{EventFilter, QueryFault};

/// Stream of new chain head numbers, one item per head-advance.
pub type HeadStream = Pin<Box<dyn Stream<Item = Result<BlockNumber, QueryFault>> + Send>>;

/// Read access to a ledger.
///
/// Every method is a suspension point of the engine; everything else it does is synchronous.
pub trait ChainClient: Send + Sync + 'static {
    /// Block detail attached to records when block data is requested.
    type Block: Debug + Send + Sync + 'static;
    /// Transaction detail attached to records when transaction data is requested.
    type Transaction: Debug + Send + Sync + 'static;
    /// Receipt detail attached to records when receipt data is requested.
    type Receipt: Debug + Send + Sync + 'static;

    /// Logs matching `filter` within `range`, in ledger order.
    fn get_logs(
        &self,
        filter: &EventFilter,
        range: RangeInclusive<BlockNumber>,
    ) -> impl Future<Output = Result<Vec<Log>, QueryFault>> + Send;

    /// The current chain head.
    fn get_current_head(&self) -> impl Future<Output = Result<BlockNumber, QueryFault>> + Send;

    /// Subscribes to head-advance notifications.
    fn subscribe_heads(&self) -> impl Future<Output = Result<HeadStream, QueryFault>> + Send;

    fn get_block_by_hash(
        &self,
        hash: BlockHash,
    ) -> impl Future<Output = Result<Self::Block, QueryFault>> + Send;

    fn get_transaction(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Self::Transaction, QueryFault>> + Send;

    fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Self::Receipt, QueryFault>> + Send;
}
