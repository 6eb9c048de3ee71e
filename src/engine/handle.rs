use std::{fmt, sync::Arc};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    ChainClient, FetchStatus, LOCAL_CHAIN_ID, Phase, SyncConfig, SyncError,
    engine::controller::{self, Command, Outputs},
    record::ClientRecord,
};

/// The merged record list published by a subscription, newest first.
pub type Records<C> = Vec<Arc<ClientRecord<C>>>;

/// Starts synchronizing the event history described by `config`.
///
/// The returned handle exposes the subscription's observables. A configuration that fails
/// [`SyncConfig::validate`] yields a handle whose `error()` carries the
/// [`ConfigFault`](crate::ConfigFault) and whose phase stays [`Phase::Init`]; so does a disabled
/// configuration, without the error.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime and the configuration is valid and enabled.
pub fn subscribe<C: ChainClient>(client: Arc<C>, config: SyncConfig) -> EventHistory<C> {
    let (records_tx, records) = watch::channel(Vec::new());
    let (phase_tx, phase) = watch::channel(Phase::Init);
    let (error_tx, error) = watch::channel(None);
    let (status_tx, status) = watch::channel(FetchStatus::Idle);
    let (fetching_tx, fetching) = watch::channel(false);
    let (commands_tx, commands_rx) = mpsc::channel(1);
    let shutdown = CancellationToken::new();

    let history = EventHistory {
        records,
        phase,
        error,
        status,
        fetching,
        commands: commands_tx,
        shutdown: shutdown.clone(),
        _guard: shutdown.clone().drop_guard(),
    };

    if let Err(fault) = config.validate() {
        error!(error = %fault, "Rejected event history configuration");
        error_tx.send_replace(Some(SyncError::Config(fault)));
        return history;
    }

    if !config.enabled() {
        debug!(filter = %config.filter(), "Event history subscription disabled");
        return history;
    }

    if config.chain_id() != LOCAL_CHAIN_ID {
        warn!(
            chain_id = config.chain_id(),
            "Event history replays logs with eth_getLogs, which is intended for local development \
             chains; expect heavy RPC usage on other networks"
        );
    }

    let outputs = Outputs {
        records: records_tx,
        phase: phase_tx,
        error: error_tx,
        status: status_tx,
        fetching: fetching_tx,
    };
    tokio::spawn(controller::run(client, Arc::new(config), outputs, commands_rx, shutdown));

    history
}

/// Handle to a running history subscription.
///
/// Every observable is an independent [`watch`] channel. Dropping the handle tears the subscription
/// down, same as [`shutdown`](Self::shutdown).
pub struct EventHistory<C: ChainClient> {
    records: watch::Receiver<Records<C>>,
    phase: watch::Receiver<Phase>,
    error: watch::Receiver<Option<SyncError>>,
    status: watch::Receiver<FetchStatus>,
    fetching: watch::Receiver<bool>,
    commands: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    _guard: DropGuard,
}

impl<C: ChainClient> EventHistory<C> {
    /// Deduplicated records, strictly descending by `(block_number, log_index)`.
    ///
    /// The list only grows until teardown.
    #[must_use]
    pub fn records(&self) -> watch::Receiver<Records<C>> {
        self.records.clone()
    }

    #[must_use]
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Most recent fault, cleared by the next successful fetch.
    #[must_use]
    pub fn error(&self) -> watch::Receiver<Option<SyncError>> {
        self.error.clone()
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<FetchStatus> {
        self.status.clone()
    }

    /// `true` while a window or poll is in flight.
    #[must_use]
    pub fn is_fetching(&self) -> watch::Receiver<bool> {
        self.fetching.clone()
    }

    /// Re-issues the current phase's operation without resetting the cursor or the merged
    /// records.
    ///
    /// While backfilling this retries the window after the cursor; while polling it polls up to
    /// the last known head. A refetch requested while a fetch is in flight is dropped.
    pub fn refetch(&self) {
        match self.commands.try_send(Command::Refetch) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Refetch already pending, coalescing"),
            Err(TrySendError::Closed(_)) => debug!("Subscription is not running, ignoring refetch"),
        }
    }

    /// Tears the subscription down. In-flight results are discarded and the phase becomes
    /// [`Phase::Terminated`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl<C: ChainClient> fmt::Debug for EventHistory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHistory")
            .field("phase", &*self.phase.borrow())
            .field("status", &*self.status.borrow())
            .field("record_count", &self.records.borrow().len())
            .field("is_shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
