//! Cursor, phase and re-entrancy bookkeeping of one subscription, plus the task that drives it.
//!
//! [`SyncState`] is synchronous: it decides which fetch to issue next and commits fetch results.
//! [`run`] owns a `SyncState`, performs the fetches it asks for and publishes the outputs.

use std::{ops::RangeInclusive, sync::Arc, time::Duration};

use alloy::primitives::BlockNumber;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::{Instant, sleep_until},
};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::{
    ChainClient, FetchStatus, Phase, QueryFault, SyncConfig, SyncError,
    chain::HeadStream,
    engine::{
        fetcher::{Fetched, fetch_historical_window},
        merge::MergeStage,
        poller::{plan_poll, poll_live},
    },
    record::{ClientRecord, LogRecord},
    types::{ChannelState, Publish},
};

/// A fetch the controller wants performed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Job {
    /// Next historical window from `start`. The head is queried when `head` is unknown.
    Window { start: BlockNumber, head: Option<BlockNumber> },
    /// Live range following a head-advance.
    Poll { range: RangeInclusive<BlockNumber> },
}

/// A job stamped with the epoch it was issued in. Only a result carrying the current epoch is
/// committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub epoch: u64,
    pub job: Job,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Refetch,
}

pub(crate) type Snapshot<B, T, R> = Vec<Arc<LogRecord<B, T, R>>>;

/// First delay before subscribing to head-advances again after the subscription was lost.
const HEAD_RESUBSCRIBE_MIN_DELAY: Duration = Duration::from_millis(100);
/// Upper bound of the resubscription backoff.
const HEAD_RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub(crate) struct SyncState<B, T, R> {
    config: Arc<SyncConfig>,
    phase: Phase,
    cursor: Option<BlockNumber>,
    head: Option<BlockNumber>,
    in_flight: bool,
    epoch: u64,
    merge: MergeStage<B, T, R>,
    records_dirty: bool,
    status: FetchStatus,
    error: Option<SyncError>,
}

impl<B, T, R> SyncState<B, T, R> {
    pub fn new(config: Arc<SyncConfig>) -> Self {
        Self {
            config,
            phase: Phase::Init,
            cursor: None,
            head: None,
            in_flight: false,
            epoch: 0,
            merge: MergeStage::new(),
            records_dirty: false,
            status: FetchStatus::Idle,
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Last block whose records were committed.
    pub fn cursor(&self) -> Option<BlockNumber> {
        self.cursor
    }

    pub fn head(&self) -> Option<BlockNumber> {
        self.head
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn status(&self) -> FetchStatus {
        self.status
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    /// The merged records, if they changed since the last call.
    pub fn take_records_update(&mut self) -> Option<Snapshot<B, T, R>> {
        if !self.records_dirty {
            return None;
        }
        self.records_dirty = false;
        Some(self.merge.snapshot())
    }

    /// Leaves `Init` and issues the first historical window.
    pub fn start(&mut self) -> Option<Ticket> {
        if self.phase != Phase::Init {
            return None;
        }
        self.enter(Phase::Backfilling);
        self.issue(self.window_job())
    }

    /// Records a head-advance and issues whatever fetch the current phase calls for.
    pub fn on_head(&mut self, head: BlockNumber) -> Option<Ticket> {
        if self.phase == Phase::Terminated {
            return None;
        }
        self.observe_head(head);
        self.trigger("head-advance")
    }

    /// Re-issues the current phase's operation. Cursor and merged records are left alone.
    pub fn on_refetch(&mut self) -> Option<Ticket> {
        self.trigger("refetch")
    }

    /// Records a fault that did not come from a fetch, such as a broken head subscription.
    pub fn on_fault(&mut self, error: SyncError) {
        if self.phase != Phase::Terminated {
            self.error = Some(error);
        }
    }

    /// Commits the result of the fetch issued under `epoch`.
    ///
    /// Results from an earlier epoch, or arriving after teardown, are discarded without touching
    /// any state. A successful result commits its records and advances the cursor in one step; a
    /// failed one leaves both untouched.
    pub fn on_outcome(
        &mut self,
        epoch: u64,
        outcome: Result<Fetched<LogRecord<B, T, R>>, SyncError>,
    ) -> Option<Ticket> {
        if epoch != self.epoch || !self.in_flight || self.phase == Phase::Terminated {
            debug!(epoch = epoch, current_epoch = self.epoch, "Discarding stale fetch result");
            return None;
        }
        self.in_flight = false;

        match outcome {
            Ok(fetched) => {
                self.status = FetchStatus::Success;
                self.error = None;
                self.commit(fetched)
            }
            Err(SyncError::Cancelled) => {
                debug!("Fetch cancelled");
                None
            }
            Err(error) => {
                error!(
                    error = %error,
                    phase = ?self.phase,
                    cursor = ?self.cursor,
                    "Fetch failed, cursor retained"
                );
                self.status = FetchStatus::Error;
                self.error = Some(error);
                None
            }
        }
    }

    /// Moves to `Terminated`. Any fetch still in flight is orphaned by the epoch bump.
    pub fn terminate(&mut self) {
        self.enter(Phase::Terminated);
        self.in_flight = false;
        self.epoch += 1;
    }

    fn trigger(&mut self, cause: &'static str) -> Option<Ticket> {
        if self.in_flight {
            debug!(cause = cause, phase = ?self.phase, "Fetch in flight, coalescing trigger");
            return None;
        }
        match self.phase {
            Phase::Backfilling => self.issue(self.window_job()),
            Phase::Polling => self.poll_job().and_then(|job| self.issue(job)),
            Phase::Init | Phase::CaughtUp | Phase::Terminated => {
                debug!(cause = cause, phase = ?self.phase, "Nothing to fetch in this phase");
                None
            }
        }
    }

    fn commit(&mut self, fetched: Fetched<LogRecord<B, T, R>>) -> Option<Ticket> {
        match fetched {
            Fetched::Window { range, head, records } => {
                self.observe_head(head);
                self.absorb(*range.end(), records);
                if *range.end() >= self.ceiling() {
                    self.caught_up()
                } else {
                    self.issue(self.window_job())
                }
            }
            Fetched::NoWork { head } => {
                self.observe_head(head);
                self.caught_up()
            }
            Fetched::Poll { range, records } => {
                self.absorb(*range.end(), records);
                None
            }
        }
    }

    fn absorb(&mut self, fetched_to: BlockNumber, records: Vec<LogRecord<B, T, R>>) {
        let report = self.merge.ingest(records);
        if report.changed() {
            self.records_dirty = true;
        }
        self.cursor = Some(self.cursor.map_or(fetched_to, |cursor| cursor.max(fetched_to)));
        debug!(
            cursor = fetched_to,
            inserted = report.inserted,
            replaced = report.replaced,
            dropped = report.dropped,
            "Committed fetched records"
        );
    }

    fn caught_up(&mut self) -> Option<Ticket> {
        self.enter(Phase::CaughtUp);
        if !self.config.watch_live() {
            return None;
        }
        self.enter(Phase::Polling);
        self.poll_job().and_then(|job| self.issue(job))
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            info!(from = ?self.phase, to = ?phase, cursor = ?self.cursor, "Phase transition");
            self.phase = phase;
        }
    }

    fn observe_head(&mut self, head: BlockNumber) {
        self.head = Some(self.head.map_or(head, |known| known.max(head)));
    }

    fn ceiling(&self) -> BlockNumber {
        self.head.map_or(self.config.from_block(), |head| self.config.ceiling(head))
    }

    fn window_job(&self) -> Job {
        let start = self.cursor.map_or(self.config.from_block(), |c| c.saturating_add(1));
        Job::Window { start, head: self.head }
    }

    fn poll_job(&self) -> Option<Job> {
        let range = plan_poll(self.cursor, &self.config, self.head?)?;
        Some(Job::Poll { range })
    }

    /// Single-flight gate.
    fn issue(&mut self, job: Job) -> Option<Ticket> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        self.epoch += 1;
        if self.status == FetchStatus::Idle {
            self.status = FetchStatus::Loading;
        }
        Some(Ticket { epoch: self.epoch, job })
    }
}

/// Sending halves of a subscription's observables.
#[derive(Debug)]
pub(crate) struct Outputs<B, T, R> {
    pub records: watch::Sender<Snapshot<B, T, R>>,
    pub phase: watch::Sender<Phase>,
    pub error: watch::Sender<Option<SyncError>>,
    pub status: watch::Sender<FetchStatus>,
    pub fetching: watch::Sender<bool>,
}

impl<B, T, R> Outputs<B, T, R> {
    /// Publishes every output that differs from the state.
    fn sync(&self, state: &mut SyncState<B, T, R>) -> ChannelState {
        let mut channel = ChannelState::Open;
        if let Some(records) = state.take_records_update() {
            channel = self.records.publish(records);
        }
        replace_if_changed(&self.phase, state.phase());
        replace_if_changed(&self.error, state.error().cloned());
        replace_if_changed(&self.status, state.status());
        replace_if_changed(&self.fetching, state.is_in_flight());
        channel
    }
}

fn replace_if_changed<V: PartialEq>(sender: &watch::Sender<V>, value: V) {
    sender.send_if_modified(|current| {
        if *current == value {
            return false;
        }
        *current = value;
        true
    });
}

type FetchResult<C> = (u64, Result<Fetched<ClientRecord<C>>, SyncError>);

/// Drives one subscription until `shutdown` fires or the handle is dropped.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
pub(crate) async fn run<C: ChainClient>(
    client: Arc<C>,
    config: Arc<SyncConfig>,
    outputs: Outputs<C::Block, C::Transaction, C::Receipt>,
    mut commands: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
) {
    let mut state = SyncState::new(Arc::clone(&config));
    let mut fetches: JoinSet<FetchResult<C>> = JoinSet::new();
    let mut heads = HeadWatch::new();

    if config.watch_live() &&
        !connect_heads(client.as_ref(), &mut state, &mut heads, &shutdown).await
    {
        finish(&mut state, &outputs, &mut fetches);
        return;
    }

    info!(
        filter = %config.filter(),
        from_block = config.from_block(),
        to_block = ?config.to_block(),
        batch_size = config.batch_size(),
        watch_live = config.watch_live(),
        "Starting event history subscription"
    );
    let ticket = state.start();
    dispatch(&mut fetches, &client, &config, ticket);
    outputs.sync(&mut state);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            Some(joined) = fetches.join_next(), if !fetches.is_empty() => {
                let (epoch, outcome) = match joined {
                    Ok(result) => result,
                    Err(join_error) if join_error.is_panic() => {
                        std::panic::resume_unwind(join_error.into_panic());
                    }
                    Err(_) => (state.epoch(), Err(SyncError::Cancelled)),
                };
                let ticket = state.on_outcome(epoch, outcome);
                dispatch(&mut fetches, &client, &config, ticket);
            }
            command = commands.recv() => match command {
                Some(Command::Refetch) => {
                    if config.watch_live() &&
                        !heads.is_connected() &&
                        !connect_heads(client.as_ref(), &mut state, &mut heads, &shutdown).await
                    {
                        break;
                    }
                    let ticket = state.on_refetch();
                    dispatch(&mut fetches, &client, &config, ticket);
                }
                None => {
                    debug!("Subscription handle dropped");
                    break;
                }
            },
            event = heads.next_event() => match event {
                HeadEvent::Advanced(head) => {
                    trace!(head = head, "Head advanced");
                    let ticket = state.on_head(head);
                    dispatch(&mut fetches, &client, &config, ticket);
                }
                HeadEvent::Fault(fault) => {
                    warn!(error = %fault, "Head subscription reported an error");
                    state.on_fault(fault.into());
                }
                HeadEvent::Ended => {
                    warn!("Head subscription ended");
                    heads.lost();
                    state.on_fault(QueryFault::SubscriptionClosed.into());
                }
                HeadEvent::RetryDue => {
                    if !connect_heads(client.as_ref(), &mut state, &mut heads, &shutdown).await {
                        break;
                    }
                }
            },
        }

        if outputs.sync(&mut state).is_closed() {
            debug!("No record observers left, stopping subscription");
            break;
        }
    }

    finish(&mut state, &outputs, &mut fetches);
}

fn finish<B, T, R, F: 'static>(
    state: &mut SyncState<B, T, R>,
    outputs: &Outputs<B, T, R>,
    fetches: &mut JoinSet<F>,
) {
    fetches.abort_all();
    state.terminate();
    outputs.sync(state);
    info!(cursor = ?state.cursor(), "Event history subscription terminated");
}

fn dispatch<C: ChainClient>(
    fetches: &mut JoinSet<FetchResult<C>>,
    client: &Arc<C>,
    config: &Arc<SyncConfig>,
    ticket: Option<Ticket>,
) {
    let Some(Ticket { epoch, job }) = ticket else {
        return;
    };
    let client = Arc::clone(client);
    let config = Arc::clone(config);
    fetches.spawn(async move {
        let outcome = match job {
            Job::Window { start, head } => {
                fetch_historical_window(&client, &config, start, head).await
            }
            Job::Poll { range } => poll_live(&client, &config, range).await,
        };
        (epoch, outcome)
    });
}

/// Subscribes to head-advances unless `shutdown` fires first. Returns `false` on shutdown.
///
/// A failed attempt publishes the fault and schedules the next one.
async fn connect_heads<C: ChainClient, B, T, R>(
    client: &C,
    state: &mut SyncState<B, T, R>,
    heads: &mut HeadWatch,
    shutdown: &CancellationToken,
) -> bool {
    let subscribed = tokio::select! {
        biased;

        () = shutdown.cancelled() => return false,
        subscribed = client.subscribe_heads() => subscribed,
    };
    match subscribed {
        Ok(stream) => {
            debug!("Subscribed to head-advance notifications");
            heads.connected(stream);
        }
        Err(fault) => {
            error!(error = %fault, "Failed to subscribe to head-advance notifications");
            state.on_fault(fault.into());
            heads.lost();
        }
    }
    true
}

#[derive(Debug)]
enum HeadEvent {
    Advanced(BlockNumber),
    Fault(QueryFault),
    Ended,
    RetryDue,
}

/// The head subscription of a live subscription, with exponential backoff between
/// resubscription attempts.
struct HeadWatch {
    stream: Option<HeadStream>,
    backoff: ExponentialBackoff,
    retry_at: Option<Instant>,
}

impl HeadWatch {
    fn new() -> Self {
        Self { stream: None, backoff: Self::backoff(), retry_at: None }
    }

    fn backoff() -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(HEAD_RESUBSCRIBE_MIN_DELAY)
            .with_max_delay(HEAD_RESUBSCRIBE_MAX_DELAY)
            .with_max_times(usize::MAX)
            .build()
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connected(&mut self, stream: HeadStream) {
        self.stream = Some(stream);
        self.backoff = Self::backoff();
        self.retry_at = None;
    }

    /// Drops the stream and schedules the next subscription attempt.
    fn lost(&mut self) {
        self.stream = None;
        let delay = self.backoff.next().unwrap_or(HEAD_RESUBSCRIBE_MAX_DELAY);
        debug!(retry_in_ms = delay.as_millis(), "Scheduling head resubscription");
        self.retry_at = Some(Instant::now() + delay);
    }

    async fn next_event(&mut self) -> HeadEvent {
        match (&mut self.stream, self.retry_at) {
            (Some(stream), _) => match stream.next().await {
                Some(Ok(head)) => HeadEvent::Advanced(head),
                Some(Err(fault)) => HeadEvent::Fault(fault),
                None => HeadEvent::Ended,
            },
            (None, Some(at)) => {
                sleep_until(at).await;
                HeadEvent::RetryDue
            }
            (None, None) => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::{Address, B256, Bytes, LogData},
        rpc::types::Log,
    };

    use super::*;
    use crate::{EventFilter, RecordSource};

    type Record = LogRecord<(), (), ()>;
    type State = SyncState<(), (), ()>;

    fn config(watch_live: bool) -> Arc<SyncConfig> {
        let filter = EventFilter::new().contract_address(Address::with_last_byte(1)).event("E()");
        Arc::new(
            SyncConfig::builder(filter)
                .from_block(100)
                .batch_size(50)
                .watch_live(watch_live)
                .build(),
        )
    }

    fn record(block: u64, source: RecordSource) -> Record {
        let log = Log {
            inner: alloy::primitives::Log {
                address: Address::with_last_byte(1),
                data: LogData::new_unchecked(vec![B256::with_last_byte(1)], Bytes::new()),
            },
            block_number: Some(block),
            block_hash: Some(B256::with_last_byte(2)),
            transaction_hash: Some(B256::from([u8::try_from(block % 256).unwrap(); 32])),
            log_index: Some(0),
            ..Default::default()
        };
        Record::new(log, source)
    }

    fn window(
        range: RangeInclusive<BlockNumber>,
        head: BlockNumber,
        records: Vec<Record>,
    ) -> Result<Fetched<Record>, SyncError> {
        Ok(Fetched::Window { range, head, records })
    }

    fn window_start(ticket: Option<&Ticket>) -> Option<BlockNumber> {
        match ticket.map(|t| &t.job) {
            Some(Job::Window { start, .. }) => Some(*start),
            _ => None,
        }
    }

    #[test]
    fn backfill_walks_windows_then_catches_up() {
        let mut state = State::new(config(false));

        let ticket = state.start().unwrap();
        assert_eq!(ticket.job, Job::Window { start: 100, head: None });
        assert_eq!(state.phase(), Phase::Backfilling);

        let mut ticket = state.on_outcome(ticket.epoch, window(100..=149, 250, vec![])).unwrap();
        let mut starts = vec![100];
        while let Job::Window { start, head } = ticket.job.clone() {
            assert_eq!(head, Some(250));
            starts.push(start);
            let end = (start + 49).min(250);
            match state.on_outcome(ticket.epoch, window(start..=end, 250, vec![])) {
                Some(next) => ticket = next,
                None => break,
            }
        }

        assert_eq!(starts, vec![100, 150, 200, 250]);
        assert_eq!(state.phase(), Phase::CaughtUp);
        assert_eq!(state.cursor(), Some(250));
        assert!(!state.is_in_flight());
    }

    #[test]
    fn catching_up_with_live_following_enters_polling() {
        let mut state = State::new(config(true));
        let ticket = state.start().unwrap();

        let next = state.on_outcome(ticket.epoch, window(100..=120, 120, vec![]));

        assert_eq!(state.phase(), Phase::Polling);
        assert!(next.is_none(), "cursor already at head, poll is a no-op");

        let poll = state.on_head(123).unwrap();
        assert_eq!(poll.job, Job::Poll { range: 121..=123 });
    }

    #[test]
    fn no_work_goes_straight_to_caught_up() {
        let mut state = State::new(config(false));
        let ticket = state.start().unwrap();

        let next = state.on_outcome(ticket.epoch, Ok(Fetched::NoWork { head: 50 }));

        assert!(next.is_none());
        assert_eq!(state.phase(), Phase::CaughtUp);
        assert_eq!(state.cursor(), None);
    }

    #[test]
    fn failure_retains_cursor_and_refetch_reissues_window() {
        let mut state = State::new(config(false));
        let ticket = state.start().unwrap();
        let ticket = state.on_outcome(ticket.epoch, window(100..=149, 250, vec![])).unwrap();
        assert_eq!(window_start(Some(&ticket)), Some(150));

        let next = state.on_outcome(ticket.epoch, Err(QueryFault::Timeout.into()));

        assert!(next.is_none());
        assert_eq!(state.cursor(), Some(149));
        assert_eq!(state.status(), FetchStatus::Error);
        assert_eq!(state.error(), Some(&SyncError::Query(QueryFault::Timeout)));
        assert_eq!(state.phase(), Phase::Backfilling);

        let retry = state.on_refetch().unwrap();
        assert_eq!(retry.job, Job::Window { start: 150, head: Some(250) });

        let _ = state.on_outcome(retry.epoch, window(150..=199, 250, vec![]));
        assert_eq!(state.cursor(), Some(199));
        assert_eq!(state.error(), None);
        assert_eq!(state.status(), FetchStatus::Success);
    }

    #[test]
    fn triggers_are_coalesced_while_a_fetch_is_in_flight() {
        let mut state = State::new(config(true));
        let ticket = state.start().unwrap();

        assert!(state.on_refetch().is_none());
        assert!(state.on_head(300).is_none());
        assert_eq!(state.head(), Some(300));
        assert!(state.is_in_flight());
        assert_eq!(state.epoch(), ticket.epoch);
    }

    #[test]
    fn stale_results_are_discarded() {
        let mut state = State::new(config(false));
        let ticket = state.start().unwrap();

        let next = state.on_outcome(
            ticket.epoch + 1,
            window(100..=149, 250, vec![record(120, RecordSource::Historical)]),
        );

        assert!(next.is_none());
        assert_eq!(state.cursor(), None);
        assert!(state.is_in_flight());
        assert!(state.take_records_update().is_none());
    }

    #[test]
    fn results_after_teardown_are_discarded() {
        let mut state = State::new(config(false));
        let ticket = state.start().unwrap();
        state.terminate();

        let next = state.on_outcome(
            ticket.epoch,
            window(100..=149, 250, vec![record(120, RecordSource::Historical)]),
        );

        assert!(next.is_none());
        assert_eq!(state.phase(), Phase::Terminated);
        assert_eq!(state.cursor(), None);
        assert!(state.take_records_update().is_none());
        assert!(state.on_head(260).is_none());
        assert!(state.on_refetch().is_none());
    }

    #[test]
    fn records_and_cursor_commit_together() {
        let mut state = State::new(config(false));
        let ticket = state.start().unwrap();

        let _ = state.on_outcome(
            ticket.epoch,
            window(
                100..=149,
                250,
                vec![record(101, RecordSource::Historical), record(149, RecordSource::Historical)],
            ),
        );

        assert_eq!(state.cursor(), Some(149));
        let records = state.take_records_update().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].block_number(), Some(149));
        assert!(state.take_records_update().is_none());
    }

    #[test]
    fn empty_live_poll_still_advances_cursor() {
        let mut state = State::new(config(true));
        let ticket = state.start().unwrap();
        let _ = state.on_outcome(ticket.epoch, window(100..=120, 120, vec![]));

        let poll = state.on_head(130).unwrap();
        let polled = Fetched::Poll { range: 121..=130, records: vec![] };
        let _ = state.on_outcome(poll.epoch, Ok(polled));

        assert_eq!(state.cursor(), Some(130));
        assert!(state.on_head(130).is_none());
    }

    #[test]
    fn cancelled_fetch_is_never_published() {
        let mut state = State::new(config(false));
        let ticket = state.start().unwrap();

        let _ = state.on_outcome(ticket.epoch, Err(SyncError::Cancelled));

        assert_eq!(state.error(), None);
        assert!(!state.is_in_flight());
    }

    #[test]
    fn status_tracks_first_fetch() {
        let mut state = State::new(config(false));
        assert_eq!(state.status(), FetchStatus::Idle);

        let ticket = state.start().unwrap();
        assert_eq!(state.status(), FetchStatus::Loading);

        let _ = state.on_outcome(ticket.epoch, Ok(Fetched::NoWork { head: 10 }));
        assert_eq!(state.status(), FetchStatus::Success);
    }

    #[tokio::test]
    async fn lost_head_stream_schedules_a_growing_retry() {
        let mut heads = HeadWatch::new();
        let idle = tokio::time::timeout(Duration::from_millis(20), heads.next_event()).await;
        assert!(idle.is_err());

        heads.lost();
        let first = heads.retry_at.map(|at| at - Instant::now());
        assert!(first.is_some_and(|delay| delay <= HEAD_RESUBSCRIBE_MIN_DELAY));
        let event = tokio::time::timeout(Duration::from_secs(1), heads.next_event()).await;
        assert!(matches!(event, Ok(HeadEvent::RetryDue)));

        heads.lost();
        let second = heads.retry_at.map(|at| at - Instant::now());
        assert!(second.is_some_and(|delay| delay > HEAD_RESUBSCRIBE_MIN_DELAY));
    }

    #[tokio::test]
    async fn reconnected_head_stream_resets_the_backoff() {
        let mut heads = HeadWatch::new();
        heads.lost();
        heads.lost();

        let stream: HeadStream = Box::pin(tokio_stream::iter(vec![Ok(7)]));
        heads.connected(stream);
        assert!(heads.is_connected());
        assert!(heads.retry_at.is_none());
        assert!(matches!(heads.next_event().await, HeadEvent::Advanced(7)));
        assert!(matches!(heads.next_event().await, HeadEvent::Ended));

        heads.lost();
        assert!(!heads.is_connected());
        let delay = heads.retry_at.map(|at| at - Instant::now());
        assert!(delay.is_some_and(|delay| delay <= HEAD_RESUBSCRIBE_MIN_DELAY));
    }
}
