//! Scripted in-memory ledger.
//!
//! [`MockChainClient`] serves logs that tests emit by hand, records every log query it answers
//! and fails on request. Heads only move when the test says so.

use std::{
    ops::RangeInclusive,
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy::{
    eips::BlockId,
    primitives::{Address, B256, BlockHash, BlockNumber, Bytes, LogData, TxHash, address, keccak256},
    rpc::types::Log,
};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{ChainClient, EventFilter, QueryFault, chain::HeadStream};

/// Contract every emitted log is attributed to.
pub const MOCK_CONTRACT: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

/// Event signature of every emitted log.
pub const MOCK_EVENT: &str = "CountIncreased(uint256)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockBlock {
    pub number: BlockNumber,
    pub hash: BlockHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockTransaction {
    pub hash: TxHash,
    pub block_number: BlockNumber,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockReceipt {
    pub transaction_hash: TxHash,
    pub status: bool,
}

/// A one-shot fault, consumed by the first call it applies to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// The next log query times out.
    Logs,
    /// The next log query starting at this block times out.
    LogsFrom(BlockNumber),
    /// The next head lookup times out.
    Head,
    /// The next head subscription attempt times out.
    Subscribe,
    /// The next block lookup finds nothing.
    Block,
    /// The next transaction lookup finds nothing.
    Transaction,
    /// The next receipt lookup finds nothing.
    Receipt,
}

impl Failure {
    fn applies_to_logs(self, range: &RangeInclusive<BlockNumber>) -> bool {
        match self {
            Failure::Logs => true,
            Failure::LogsFrom(start) => start == *range.start(),
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    head: BlockNumber,
    logs: Vec<Log>,
    log_queries: Vec<RangeInclusive<BlockNumber>>,
    head_queries: usize,
    failures: Vec<Failure>,
    head_subscribers: Vec<mpsc::UnboundedSender<Result<BlockNumber, QueryFault>>>,
    next_transaction: u64,
}

impl Ledger {
    fn take_failure(&mut self, applies: impl Fn(Failure) -> bool) -> bool {
        match self.failures.iter().position(|failure| applies(*failure)) {
            Some(position) => {
                self.failures.remove(position);
                true
            }
            None => false,
        }
    }

    fn broadcast(&mut self, item: &Result<BlockNumber, QueryFault>) {
        self.head_subscribers.retain(|subscriber| subscriber.send(item.clone()).is_ok());
    }
}

/// In-memory [`ChainClient`] driven by the test.
#[derive(Debug)]
pub struct MockChainClient {
    ledger: Mutex<Ledger>,
    log_query_count: watch::Sender<usize>,
    paused: watch::Sender<bool>,
}

impl MockChainClient {
    /// A ledger with no logs and its head at `head`.
    #[must_use]
    pub fn new(head: BlockNumber) -> Self {
        Self {
            ledger: Mutex::new(Ledger { head, ..Ledger::default() }),
            log_query_count: watch::Sender::new(0),
            paused: watch::Sender::new(false),
        }
    }

    #[must_use]
    pub fn contract(&self) -> Address {
        MOCK_CONTRACT
    }

    #[must_use]
    pub fn event(&self) -> B256 {
        keccak256(MOCK_EVENT)
    }

    /// Filter selecting every log emitted through [`emit`](Self::emit).
    #[must_use]
    pub fn filter(&self) -> EventFilter {
        EventFilter::new().contract_address(MOCK_CONTRACT).event(MOCK_EVENT)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a matching log to `block`, in its own transaction, after the block's existing logs.
    pub fn emit(&self, block: BlockNumber) -> Log {
        self.emit_from(MOCK_CONTRACT, block)
    }

    /// Adds a log with the mock event signature but emitted by `contract`.
    pub fn emit_from(&self, contract: Address, block: BlockNumber) -> Log {
        let mut ledger = self.ledger();
        let log_index = ledger.logs.iter().filter(|log| log.block_number == Some(block)).count();
        ledger.next_transaction += 1;
        let log = Log {
            inner: alloy::primitives::Log {
                address: contract,
                data: LogData::new_unchecked(
                    vec![keccak256(MOCK_EVENT)],
                    Bytes::copy_from_slice(&ledger.next_transaction.to_be_bytes()),
                ),
            },
            block_number: Some(block),
            block_hash: Some(block_hash(block)),
            transaction_hash: Some(transaction_hash(ledger.next_transaction)),
            log_index: Some(log_index as u64),
            ..Default::default()
        };
        ledger.logs.push(log.clone());
        log
    }

    /// Stores `log` as is, even if an identical log is already present.
    pub fn push_log(&self, log: Log) {
        self.ledger().logs.push(log);
    }

    /// Arms a one-shot failure.
    pub fn fail_next(&self, failure: Failure) {
        self.ledger().failures.push(failure);
    }

    #[must_use]
    pub fn head(&self) -> BlockNumber {
        self.ledger().head
    }

    /// Moves the head to `head` and notifies every head subscriber.
    pub fn advance_head_to(&self, head: BlockNumber) {
        let mut ledger = self.ledger();
        ledger.head = head;
        ledger.broadcast(&Ok(head));
    }

    /// Delivers an error on every head subscription.
    pub fn fail_head_stream(&self, fault: QueryFault) {
        self.ledger().broadcast(&Err(fault));
    }

    /// Ends every head subscription.
    pub fn close_head_stream(&self) {
        self.ledger().head_subscribers.clear();
    }

    #[must_use]
    pub fn head_subscriber_count(&self) -> usize {
        self.ledger().head_subscribers.iter().filter(|s| !s.is_closed()).count()
    }

    /// Every log query answered or attempted so far, in call order.
    #[must_use]
    pub fn log_queries(&self) -> Vec<RangeInclusive<BlockNumber>> {
        self.ledger().log_queries.clone()
    }

    #[must_use]
    pub fn head_queries(&self) -> usize {
        self.ledger().head_queries
    }

    /// Waits until at least `count` log queries were issued.
    pub async fn wait_for_log_queries(&self, count: usize) {
        let mut receiver = self.log_query_count.subscribe();
        let _ = receiver.wait_for(|issued| *issued >= count).await;
    }

    /// Holds every log query after it is recorded, and every head subscription attempt, until
    /// [`resume`](Self::resume) is called.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }
}

impl ChainClient for MockChainClient {
    type Block = MockBlock;
    type Transaction = MockTransaction;
    type Receipt = MockReceipt;

    async fn get_logs(
        &self,
        filter: &EventFilter,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<Log>, QueryFault> {
        let failed = {
            let mut ledger = self.ledger();
            ledger.log_queries.push(range.clone());
            ledger.take_failure(|failure| failure.applies_to_logs(&range))
        };
        self.log_query_count.send_modify(|issued| *issued += 1);

        let mut paused = self.paused.subscribe();
        let _ = paused.wait_for(|paused| !*paused).await;

        if failed {
            return Err(QueryFault::Timeout);
        }
        let ledger = self.ledger();
        Ok(ledger
            .logs
            .iter()
            .filter(|log| log.block_number.is_some_and(|block| range.contains(&block)))
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn get_current_head(&self) -> Result<BlockNumber, QueryFault> {
        let mut ledger = self.ledger();
        ledger.head_queries += 1;
        if ledger.take_failure(|failure| failure == Failure::Head) {
            return Err(QueryFault::Timeout);
        }
        Ok(ledger.head)
    }

    async fn subscribe_heads(&self) -> Result<HeadStream, QueryFault> {
        let mut paused = self.paused.subscribe();
        let _ = paused.wait_for(|paused| !*paused).await;

        let mut ledger = self.ledger();
        if ledger.take_failure(|failure| failure == Failure::Subscribe) {
            return Err(QueryFault::Timeout);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        ledger.head_subscribers.push(sender);
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    async fn get_block_by_hash(&self, hash: BlockHash) -> Result<MockBlock, QueryFault> {
        let mut ledger = self.ledger();
        if ledger.take_failure(|failure| failure == Failure::Block) {
            return Err(QueryFault::BlockNotFound(BlockId::from(hash)));
        }
        ledger
            .logs
            .iter()
            .find(|log| log.block_hash == Some(hash))
            .and_then(|log| log.block_number)
            .map(|number| MockBlock { number, hash })
            .ok_or(QueryFault::BlockNotFound(BlockId::from(hash)))
    }

    async fn get_transaction(&self, hash: TxHash) -> Result<MockTransaction, QueryFault> {
        let mut ledger = self.ledger();
        if ledger.take_failure(|failure| failure == Failure::Transaction) {
            return Err(QueryFault::TransactionNotFound(hash));
        }
        ledger
            .logs
            .iter()
            .find(|log| log.transaction_hash == Some(hash))
            .and_then(|log| log.block_number)
            .map(|block_number| MockTransaction { hash, block_number })
            .ok_or(QueryFault::TransactionNotFound(hash))
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> Result<MockReceipt, QueryFault> {
        let mut ledger = self.ledger();
        if ledger.take_failure(|failure| failure == Failure::Receipt) {
            return Err(QueryFault::ReceiptNotFound(hash));
        }
        if ledger.logs.iter().any(|log| log.transaction_hash == Some(hash)) {
            Ok(MockReceipt { transaction_hash: hash, status: true })
        } else {
            Err(QueryFault::ReceiptNotFound(hash))
        }
    }
}

/// Hash the mock ledger assigns to block `number`.
#[must_use]
pub fn block_hash(number: BlockNumber) -> BlockHash {
    let mut bytes = [0xb1; 32];
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

fn transaction_hash(sequence: u64) -> TxHash {
    let mut bytes = [0x7e; 32];
    bytes[24..].copy_from_slice(&sequence.to_be_bytes());
    B256::from(bytes)
}
