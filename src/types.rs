use tokio::sync::watch;

/// Lifecycle phase of a history subscription.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Not started: the subscription is disabled or its configuration was rejected.
    Init,
    /// Replaying historical windows from `from_block` toward the ceiling.
    Backfilling,
    /// Historical replay reached the ceiling. Terminal unless live following is enabled.
    CaughtUp,
    /// Following the chain head, one poll per head-advance.
    Polling,
    /// Torn down. No further fetches are issued and late results are discarded.
    Terminated,
}

/// Coarse request status, updated on every fetch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    /// Nothing has been requested yet.
    #[default]
    Idle,
    /// The first fetch is in flight and nothing has succeeded yet.
    Loading,
    /// The most recent fetch succeeded.
    Success,
    /// The most recent fetch failed; see the subscription's error observable.
    Error,
}

/// Where a record entered the merge stage from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordSource {
    Historical,
    Live,
}

/// Whether anyone is still observing an output channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChannelState {
    Open,
    Closed,
}

impl ChannelState {
    pub fn is_closed(self) -> bool {
        matches!(self, ChannelState::Closed)
    }
}

/// Publishing onto an observable output.
pub(crate) trait Publish<T> {
    /// Replaces the observed value, returning whether any receiver is still alive.
    fn publish(&self, value: T) -> ChannelState;
}

impl<T> Publish<T> for watch::Sender<T> {
    fn publish(&self, value: T) -> ChannelState {
        if self.is_closed() {
            trace!("No observers left, dropping update");
            return ChannelState::Closed;
        }
        self.send_replace(value);
        ChannelState::Open
    }
}
