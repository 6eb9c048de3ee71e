use std::{ops::RangeInclusive, sync::Arc};

use alloy::primitives::BlockNumber;

use crate::{
    ChainClient, RecordSource, SyncConfig, SyncError,
    engine::fetcher::{Fetched, fetch_records},
    record::ClientRecord,
};

/// Range a live poll should cover, or `None` when the cursor already reached the ceiling.
///
/// The range starts right after the cursor, or at `from_block` when nothing was fetched yet.
#[must_use]
pub(crate) fn plan_poll(
    cursor: Option<BlockNumber>,
    config: &SyncConfig,
    head: BlockNumber,
) -> Option<RangeInclusive<BlockNumber>> {
    let start = match cursor {
        Some(cursor) => cursor.checked_add(1)?,
        None => config.from_block(),
    };
    let end = config.ceiling(head);
    (start <= end).then_some(start..=end)
}

/// Fetches the blocks of one head-advance.
pub(crate) async fn poll_live<C: ChainClient>(
    client: &Arc<C>,
    config: &SyncConfig,
    range: RangeInclusive<BlockNumber>,
) -> Result<Fetched<ClientRecord<C>>, SyncError> {
    debug!(from = *range.start(), to = *range.end(), "Polling live range");
    let records = fetch_records(client, config, range.clone(), RecordSource::Live).await?;
    debug!(
        from = *range.start(),
        to = *range.end(),
        record_count = records.len(),
        "Live range fetched"
    );
    Ok(Fetched::Poll { range, records })
}
