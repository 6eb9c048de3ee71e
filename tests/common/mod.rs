#![allow(dead_code)]

use std::{ops::RangeInclusive, sync::Arc, time::Duration};

use alloy::primitives::BlockNumber;
use event_history::{
    EventHistory, SyncConfig, SyncConfigBuilder, subscribe, test_utils::MockChainClient,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).try_init();
}

/// A ledger at `head` and a config builder selecting its mock event.
pub fn setup(head: BlockNumber) -> (Arc<MockChainClient>, SyncConfigBuilder) {
    init_tracing();
    let client = Arc::new(MockChainClient::new(head));
    let builder = SyncConfig::builder(client.filter());
    (client, builder)
}

pub fn start(
    client: &Arc<MockChainClient>,
    builder: SyncConfigBuilder,
) -> EventHistory<MockChainClient> {
    subscribe(Arc::clone(client), builder.build())
}

/// Polls `condition` until it holds, panicking after 5 seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "Condition not met within 5 seconds");
}

/// Asserts the queried ranges tile `from..=to` with no gap and no overlap.
pub fn assert_contiguous(
    queries: &[RangeInclusive<BlockNumber>],
    from: BlockNumber,
    to: BlockNumber,
) {
    assert!(!queries.is_empty(), "No log queries were issued");
    assert_eq!(*queries[0].start(), from, "First query does not start at {from}: {queries:?}");
    for pair in queries.windows(2) {
        assert_eq!(*pair[1].start(), pair[0].end() + 1, "Queries are not contiguous: {queries:?}");
    }
    let last = &queries[queries.len() - 1];
    assert_eq!(*last.end(), to, "Last query does not end at {to}: {queries:?}");
}
