use std::{fmt::Debug, ops::RangeInclusive, time::Duration};

use alloy::{
    eips::BlockId,
    network::{Ethereum, Network},
    primitives::{BlockHash, BlockNumber, TxHash},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;

use crate::{ChainClient, EventFilter, HeadStream, QueryFault};

/// Provider wrapper with built-in retry and timeout mechanisms.
///
/// Every RPC call is retried with exponential backoff, bounded by a total timeout, and failed over
/// to the fallback providers in the order they were added.
///
/// # Retry errors
///
/// * [`QueryFault::Timeout`] if the call timeout elapsed on every provider.
/// * [`QueryFault::RpcError`] carrying the last provider's error otherwise.
#[derive(Clone, Debug)]
pub struct RobustProvider<N: Network = Ethereum> {
    pub(crate) primary_provider: RootProvider<N>,
    pub(crate) fallback_providers: Vec<RootProvider<N>>,
    pub(crate) call_timeout: Duration,
    pub(crate) subscription_timeout: Duration,
    pub(crate) max_retries: usize,
    pub(crate) min_delay: Duration,
    pub(crate) reconnect_interval: Duration,
    pub(crate) head_poll_interval: Duration,
    pub(crate) head_buffer_capacity: usize,
}

impl<N: Network> RobustProvider<N> {
    #[must_use]
    pub fn primary(&self) -> &RootProvider<N> {
        &self.primary_provider
    }

    /// Fetch the latest block number.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn get_block_number(&self) -> Result<BlockNumber, QueryFault> {
        trace!("eth_blockNumber called");
        let result = self
            .try_operation_with_failover(
                move |provider| async move { provider.get_block_number().await },
                false,
            )
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_blockNumber failed");
        }
        result
    }

    /// Fetch a block by [`BlockHash`].
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors). [`QueryFault::BlockNotFound`] if the node does not know
    /// the block.
    pub async fn get_block_by_hash(&self, hash: BlockHash) -> Result<N::BlockResponse, QueryFault> {
        trace!(hash = %hash, "eth_getBlockByHash called");
        let result = self
            .try_operation_with_failover(
                move |provider| async move { provider.get_block_by_hash(hash).await },
                false,
            )
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_getBlockByHash failed");
        }
        result?.ok_or_else(|| QueryFault::BlockNotFound(BlockId::from(hash)))
    }

    /// Fetch a transaction by hash.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors). [`QueryFault::TransactionNotFound`] if the node does not
    /// know the transaction.
    pub async fn get_transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<N::TransactionResponse, QueryFault> {
        trace!(hash = %hash, "eth_getTransactionByHash called");
        let result = self
            .try_operation_with_failover(
                move |provider| async move { provider.get_transaction_by_hash(hash).await },
                false,
            )
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_getTransactionByHash failed");
        }
        result?.ok_or(QueryFault::TransactionNotFound(hash))
    }

    /// Fetch the receipt of a transaction.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors). [`QueryFault::ReceiptNotFound`] if the transaction is
    /// unknown or still pending.
    pub async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<N::ReceiptResponse, QueryFault> {
        trace!(hash = %hash, "eth_getTransactionReceipt called");
        let result = self
            .try_operation_with_failover(
                move |provider| async move { provider.get_transaction_receipt(hash).await },
                false,
            )
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_getTransactionReceipt failed");
        }
        result?.ok_or(QueryFault::ReceiptNotFound(hash))
    }

    /// Fetch logs for the given [`Filter`].
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, QueryFault> {
        trace!("eth_getLogs called");
        let result = self
            .try_operation_with_failover(
                move |provider| async move { provider.get_logs(filter).await },
                false,
            )
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_getLogs failed");
        }
        result
    }

    /// Execute `operation` with exponential backoff and a total timeout, on the primary provider
    /// first and then on each fallback in order.
    ///
    /// If `require_pubsub` is true, fallbacks without pubsub support are skipped.
    ///
    /// # Errors
    ///
    /// See [retry errors](#retry-errors).
    pub(crate) async fn try_operation_with_failover<T: Debug, F, Fut>(
        &self,
        operation: F,
        require_pubsub: bool,
    ) -> Result<T, QueryFault>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        match self.try_provider_with_timeout(self.primary(), &operation).await {
            Ok(value) => Ok(value),
            Err(primary_error) => self
                .try_fallback_providers_from(&operation, require_pubsub, primary_error, 0)
                .await
                .map(|(value, _)| value),
        }
    }

    /// Tries the fallbacks starting at `start_index`, returning the value and the index of the
    /// fallback that produced it.
    pub(crate) async fn try_fallback_providers_from<T: Debug, F, Fut>(
        &self,
        operation: F,
        require_pubsub: bool,
        mut last_error: QueryFault,
        start_index: usize,
    ) -> Result<(T, usize), QueryFault>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let num_fallbacks = self.fallback_providers.len();
        if num_fallbacks > 0 && start_index == 0 {
            info!(error = %last_error, "Primary provider failed, trying fallback provider(s)");
        }

        let fallback_providers = self.fallback_providers.iter().enumerate().skip(start_index);
        for (fallback_idx, provider) in fallback_providers {
            if require_pubsub && !Self::supports_pubsub(provider) {
                debug!(provider_num = fallback_idx + 1, "Fallback lacks pubsub, skipping");
                continue;
            }

            match self.try_provider_with_timeout(provider, &operation).await {
                Ok(value) => {
                    info!(provider_num = fallback_idx + 1, "Fallback provider succeeded");
                    return Ok((value, fallback_idx));
                }
                Err(e) => {
                    warn!(provider_num = fallback_idx + 1, error = %e, "Fallback provider failed");
                    last_error = e;
                }
            }
        }

        if num_fallbacks > 0 {
            error!(error = %last_error, "All providers failed or timed out");
        }
        Err(last_error)
    }

    /// Try executing an operation with a specific provider with retry and timeout.
    pub(crate) async fn try_provider_with_timeout<T, F, Fut>(
        &self,
        provider: &RootProvider<N>,
        operation: F,
    ) -> Result<T, QueryFault>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let retry_strategy = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay);

        timeout(
            self.call_timeout,
            (|| operation(provider.clone()))
                .retry(retry_strategy)
                .notify(|err: &RpcError<TransportErrorKind>, dur: Duration| {
                    debug!(error = %err, retry_in_ms = dur.as_millis(), "RPC error, retrying");
                })
                .sleep(tokio::time::sleep),
        )
        .await?
        .map_err(QueryFault::from)
    }

    /// Whether any configured provider can serve subscriptions.
    pub(crate) fn any_pubsub(&self) -> bool {
        std::iter::once(&self.primary_provider)
            .chain(&self.fallback_providers)
            .any(Self::supports_pubsub)
    }

    pub(crate) fn supports_pubsub(provider: &RootProvider<N>) -> bool {
        provider.client().pubsub_frontend().is_some()
    }
}

impl<N: Network> ChainClient for RobustProvider<N> {
    type Block = N::BlockResponse;
    type Transaction = N::TransactionResponse;
    type Receipt = N::ReceiptResponse;

    async fn get_logs(
        &self,
        filter: &EventFilter,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<Log>, QueryFault> {
        let log_filter = Filter::from(filter).from_block(*range.start()).to_block(*range.end());
        RobustProvider::get_logs(self, &log_filter).await
    }

    async fn get_current_head(&self) -> Result<BlockNumber, QueryFault> {
        self.get_block_number().await
    }

    async fn subscribe_heads(&self) -> Result<HeadStream, QueryFault> {
        self.watch_heads().await
    }

    async fn get_block_by_hash(&self, hash: BlockHash) -> Result<Self::Block, QueryFault> {
        RobustProvider::get_block_by_hash(self, hash).await
    }

    async fn get_transaction(&self, hash: TxHash) -> Result<Self::Transaction, QueryFault> {
        self.get_transaction_by_hash(hash).await
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> Result<Self::Receipt, QueryFault> {
        RobustProvider::get_transaction_receipt(self, hash).await
    }
}
