//! Head-advance notifications over a [`RobustProvider`].
//!
//! With a pubsub-capable provider heads come from `eth_subscribe("newHeads")`, failing over to
//! the fallbacks and periodically reconnecting to the primary. Otherwise `eth_blockNumber` is
//! polled. Either way only strictly increasing head numbers are forwarded.

use std::time::{Duration, Instant};

use alloy::{
    consensus::BlockHeader,
    network::Network,
    primitives::BlockNumber,
    providers::{Provider, RootProvider},
    pubsub::Subscription,
};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    time::{MissedTickBehavior, interval, timeout},
};
use tokio_stream::wrappers::ReceiverStream;

use crate::{HeadStream, QueryFault, robust_provider::RobustProvider};

/// Default time between primary provider reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Default `eth_blockNumber` polling interval when no provider supports pubsub.
pub const DEFAULT_HEAD_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Default number of head notifications buffered for a slow consumer.
pub const DEFAULT_HEAD_BUFFER_CAPACITY: usize = 128;

/// Maximum number of consecutive lags before switching providers.
const MAX_LAG_COUNT: usize = 3;

impl<N: Network> RobustProvider<N> {
    /// Streams new head numbers.
    ///
    /// The stream yields an error and ends once every provider failed; subscribe again to resume.
    ///
    /// # Errors
    ///
    /// See [retry errors](RobustProvider#retry-errors).
    pub async fn watch_heads(&self) -> Result<HeadStream, QueryFault> {
        let (sender, receiver) = mpsc::channel(self.head_buffer_capacity.max(1));

        if self.any_pubsub() {
            let subscription = self
                .try_operation_with_failover(
                    move |provider| async move { provider.subscribe_blocks().await },
                    true,
                )
                .await
                .inspect_err(|e| error!(error = %e, "eth_subscribe failed"))?;
            let watcher = HeadSubscription::new(subscription, self.clone());
            tokio::spawn(watcher.forward(sender));
        } else {
            debug!(
                interval_ms = self.head_poll_interval.as_millis(),
                "No pubsub-capable provider, polling for new heads"
            );
            tokio::spawn(poll_heads(self.clone(), sender));
        }

        Ok(Box::pin(ReceiverStream::new(receiver)))
    }
}

/// A `newHeads` subscription that survives provider failures.
#[derive(Debug)]
struct HeadSubscription<N: Network> {
    subscription: Subscription<N::HeaderResponse>,
    provider: RobustProvider<N>,
    last_reconnect_attempt: Option<Instant>,
    consecutive_lags: usize,
    current_fallback_index: Option<usize>,
}

impl<N: Network> HeadSubscription<N> {
    fn new(subscription: Subscription<N::HeaderResponse>, provider: RobustProvider<N>) -> Self {
        Self {
            subscription,
            provider,
            last_reconnect_attempt: None,
            consecutive_lags: 0,
            current_fallback_index: None,
        }
    }

    async fn forward(mut self, sender: mpsc::Sender<Result<BlockNumber, QueryFault>>) {
        let mut last_head = None;
        loop {
            let next = tokio::select! {
                () = sender.closed() => break,
                next = self.next_head() => next,
            };
            match next {
                Ok(head) => {
                    if last_head.is_some_and(|last| head <= last) {
                        continue;
                    }
                    last_head = Some(head);
                    if sender.send(Ok(head)).await.is_err() {
                        break;
                    }
                }
                Err(fault) => {
                    _ = sender.send(Err(fault)).await;
                    break;
                }
            }
        }
        debug!("Head subscription ended");
    }

    /// Next head number, switching providers as needed.
    async fn next_head(&mut self) -> Result<BlockNumber, QueryFault> {
        let subscription_timeout = self.provider.subscription_timeout;
        loop {
            self.try_reconnect_to_primary().await;

            match timeout(subscription_timeout, self.subscription.recv()).await {
                Ok(Ok(header)) => {
                    self.consecutive_lags = 0;
                    return Ok(header.number());
                }
                Ok(Err(RecvError::Closed)) => {
                    warn!("Head subscription closed, switching provider");
                    self.switch_to_fallback(QueryFault::SubscriptionClosed).await?;
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    self.consecutive_lags += 1;
                    warn!(
                        skipped = skipped,
                        consecutive_lags = self.consecutive_lags,
                        "Head subscription lagged"
                    );
                    if self.consecutive_lags >= MAX_LAG_COUNT {
                        self.switch_to_fallback(QueryFault::SubscriptionClosed).await?;
                    }
                }
                Err(elapsed) => {
                    warn!(
                        timeout_secs = subscription_timeout.as_secs(),
                        "No new head within the subscription timeout, switching provider"
                    );
                    if self.current_fallback_index.is_some() &&
                        self.try_reconnect_to_primary().await
                    {
                        continue;
                    }
                    self.switch_to_fallback(elapsed.into()).await?;
                }
            }
        }
    }

    /// Reconnects to the primary once the reconnect interval has passed since the last attempt.
    /// Returns whether the primary is serving the subscription again.
    async fn try_reconnect_to_primary(&mut self) -> bool {
        let due = self
            .last_reconnect_attempt
            .is_some_and(|last| last.elapsed() >= self.provider.reconnect_interval);
        if !due {
            return false;
        }

        let operation =
            move |provider: RootProvider<N>| async move { provider.subscribe_blocks().await };
        let primary = self.provider.primary();
        match self.provider.try_provider_with_timeout(primary, &operation).await {
            Ok(subscription) => {
                info!("Head subscription reconnected to primary provider");
                self.subscription = subscription;
                self.current_fallback_index = None;
                self.last_reconnect_attempt = None;
                true
            }
            Err(e) => {
                self.last_reconnect_attempt = Some(Instant::now());
                debug!(error = %e, "Primary provider still unavailable");
                false
            }
        }
    }

    async fn switch_to_fallback(&mut self, last_error: QueryFault) -> Result<(), QueryFault> {
        if self.last_reconnect_attempt.is_none() {
            self.last_reconnect_attempt = Some(Instant::now());
        }

        let operation =
            move |provider: RootProvider<N>| async move { provider.subscribe_blocks().await };
        let start_index = self.current_fallback_index.map_or(0, |idx| idx + 1);

        let (subscription, fallback_idx) = self
            .provider
            .try_fallback_providers_from(&operation, true, last_error, start_index)
            .await
            .inspect_err(|e| error!(error = %e, "No provider left to subscribe to new heads"))?;
        self.subscription = subscription;
        self.current_fallback_index = Some(fallback_idx);
        self.consecutive_lags = 0;
        Ok(())
    }
}

/// Polls `eth_blockNumber`, forwarding every new head. Errors are forwarded and polling goes on.
async fn poll_heads<N: Network>(
    provider: RobustProvider<N>,
    sender: mpsc::Sender<Result<BlockNumber, QueryFault>>,
) {
    let mut ticker = interval(provider.head_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_head = None;

    loop {
        tokio::select! {
            () = sender.closed() => break,
            _ = ticker.tick() => {}
        }

        let item = match provider.get_block_number().await {
            Ok(head) if last_head.is_some_and(|last| head <= last) => continue,
            Ok(head) => {
                last_head = Some(head);
                Ok(head)
            }
            Err(fault) => Err(fault),
        };
        if sender.send(item).await.is_err() {
            break;
        }
    }
    debug!("Head polling stopped");
}
