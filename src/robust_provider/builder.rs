use std::{pin::Pin, time::Duration};

use alloy::{network::Network, providers::RootProvider};

use crate::{
    QueryFault,
    robust_provider::{
        DEFAULT_HEAD_BUFFER_CAPACITY, DEFAULT_HEAD_POLL_INTERVAL, DEFAULT_RECONNECT_INTERVAL,
        IntoRootProvider, RobustProvider,
    },
};

type BoxedProviderFuture<N> =
    Pin<Box<dyn Future<Output = Result<RootProvider<N>, QueryFault>> + Send>>;

/// Default total timeout for a single RPC call, retries included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default time to wait for the next head on a subscription.
pub const DEFAULT_SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default maximum number of retry attempts.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default base delay between retries.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Builder for constructing a [`RobustProvider`].
///
/// Configures timeouts, retry backoff, head watching and any number of fallback providers.
pub struct RobustProviderBuilder<N: Network, P: IntoRootProvider<N>> {
    primary_provider: P,
    fallback_providers: Vec<BoxedProviderFuture<N>>,
    call_timeout: Duration,
    subscription_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
    reconnect_interval: Duration,
    head_poll_interval: Duration,
    head_buffer_capacity: usize,
}

impl<N: Network, P: IntoRootProvider<N>> RobustProviderBuilder<N, P> {
    /// Starts a builder with default settings and `provider` as the primary.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            primary_provider: provider,
            fallback_providers: vec![],
            call_timeout: DEFAULT_CALL_TIMEOUT,
            subscription_timeout: DEFAULT_SUBSCRIPTION_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            head_poll_interval: DEFAULT_HEAD_POLL_INTERVAL,
            head_buffer_capacity: DEFAULT_HEAD_BUFFER_CAPACITY,
        }
    }

    /// Like [`new`](Self::new), but without retries. Only the call timeout applies.
    #[must_use]
    pub fn fragile(provider: P) -> Self {
        Self::new(provider).max_retries(0).min_delay(Duration::ZERO)
    }

    /// Adds a fallback provider, tried in insertion order once the primary fails.
    #[must_use]
    pub fn fallback<F: IntoRootProvider<N> + Send + 'static>(mut self, provider: F) -> Self {
        self.fallback_providers.push(Box::pin(provider.into_root_provider()));
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets how long a head subscription may stay silent before the provider is considered dead.
    ///
    /// Keep this above the chain's block time. Default is [`DEFAULT_SUBSCRIPTION_TIMEOUT`].
    #[must_use]
    pub fn subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay of the exponential backoff.
    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Sets how often a failed-over head subscription tries the primary again.
    ///
    /// Default is [`DEFAULT_RECONNECT_INTERVAL`].
    #[must_use]
    pub fn reconnect_interval(mut self, reconnect_interval: Duration) -> Self {
        self.reconnect_interval = reconnect_interval;
        self
    }

    /// Sets the `eth_blockNumber` polling interval used when no provider supports pubsub.
    ///
    /// Default is [`DEFAULT_HEAD_POLL_INTERVAL`].
    #[must_use]
    pub fn head_poll_interval(mut self, interval: Duration) -> Self {
        self.head_poll_interval = interval;
        self
    }

    /// Sets how many head notifications are buffered before the watcher waits on the consumer.
    ///
    /// Default is [`DEFAULT_HEAD_BUFFER_CAPACITY`].
    #[must_use]
    pub fn head_buffer_capacity(mut self, capacity: usize) -> Self {
        self.head_buffer_capacity = capacity;
        self
    }

    /// Connects every provider and returns the [`RobustProvider`].
    ///
    /// # Errors
    ///
    /// Returns an error if any of the providers fail to connect.
    pub async fn build(self) -> Result<RobustProvider<N>, QueryFault> {
        debug!(
            call_timeout_ms = self.call_timeout.as_millis(),
            subscription_timeout_ms = self.subscription_timeout.as_millis(),
            max_retries = self.max_retries,
            fallback_count = self.fallback_providers.len(),
            "Building RobustProvider"
        );

        let primary_provider = self.primary_provider.into_root_provider().await?;

        let mut fallback_providers = Vec::with_capacity(self.fallback_providers.len());
        for (idx, fallback) in self.fallback_providers.into_iter().enumerate() {
            trace!(fallback_index = idx, "Connecting fallback provider");
            fallback_providers.push(fallback.await?);
        }

        info!("RobustProvider initialized");

        Ok(RobustProvider {
            primary_provider,
            fallback_providers,
            call_timeout: self.call_timeout,
            subscription_timeout: self.subscription_timeout,
            max_retries: self.max_retries,
            min_delay: self.min_delay,
            reconnect_interval: self.reconnect_interval,
            head_poll_interval: self.head_poll_interval,
            head_buffer_capacity: self.head_buffer_capacity,
        })
    }
}
