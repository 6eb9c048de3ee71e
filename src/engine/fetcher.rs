use std::{ops::RangeInclusive, sync::Arc};

use alloy::{primitives::BlockNumber, rpc::types::Log};
use tokio::task::JoinSet;

use crate::{
    ChainClient, QueryFault, RecordSource, SyncConfig, SyncError,
    config::Enrichment,
    engine::planner::plan_window,
    record::{ClientRecord, LogRecord},
};

/// Result of one successful fetch, handed back to the controller for commit.
#[derive(Debug)]
pub(crate) enum Fetched<Rec> {
    /// A historical window was fetched.
    Window { range: RangeInclusive<BlockNumber>, head: BlockNumber, records: Vec<Rec> },
    /// The cursor is already past the ceiling; there is nothing left to replay.
    NoWork { head: BlockNumber },
    /// A live poll range was fetched.
    Poll { range: RangeInclusive<BlockNumber>, records: Vec<Rec> },
}

/// Fetches the next historical window starting at `start`.
///
/// When `known_head` is `None` the current head is queried first.
pub(crate) async fn fetch_historical_window<C: ChainClient>(
    client: &Arc<C>,
    config: &SyncConfig,
    start: BlockNumber,
    known_head: Option<BlockNumber>,
) -> Result<Fetched<ClientRecord<C>>, SyncError> {
    let head = match known_head {
        Some(head) => head,
        None => client.get_current_head().await?,
    };

    let Some(range) = plan_window(start, config.batch_size(), config.ceiling(head)) else {
        debug!(start = start, head = head, "No historical blocks left to fetch");
        return Ok(Fetched::NoWork { head });
    };

    debug!(from = *range.start(), to = *range.end(), "Fetching historical window");
    let records = fetch_records(client, config, range.clone(), RecordSource::Historical).await?;
    debug!(
        from = *range.start(),
        to = *range.end(),
        record_count = records.len(),
        "Historical window fetched"
    );

    Ok(Fetched::Window { range, head, records })
}

/// Queries the logs in `range` and attaches the details requested by `config`.
///
/// Detail lookups for the logs of one range run concurrently. The first failing lookup fails the
/// whole range and the outstanding lookups are aborted.
pub(crate) async fn fetch_records<C: ChainClient>(
    client: &Arc<C>,
    config: &SyncConfig,
    range: RangeInclusive<BlockNumber>,
    source: RecordSource,
) -> Result<Vec<ClientRecord<C>>, SyncError> {
    let logs = client.get_logs(config.filter(), range).await?;

    let enrichment = config.enrichment();
    if !enrichment.any() {
        return Ok(logs.into_iter().map(|log| LogRecord::new(log, source)).collect());
    }

    let count = logs.len();
    let mut lookups = JoinSet::new();
    for (index, log) in logs.into_iter().enumerate() {
        let client = Arc::clone(client);
        lookups.spawn(async move {
            enrich(client.as_ref(), log, source, enrichment).await.map(|record| (index, record))
        });
    }

    let mut slots: Vec<Option<ClientRecord<C>>> =
        std::iter::repeat_with(|| None).take(count).collect();
    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok(Ok((index, record))) => slots[index] = Some(record),
            Ok(Err(fault)) => {
                warn!(error = %fault, "Detail lookup failed, discarding range");
                return Err(fault.into());
            }
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic());
            }
            Err(_) => return Err(SyncError::Cancelled),
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

async fn enrich<C: ChainClient>(
    client: &C,
    log: Log,
    source: RecordSource,
    enrichment: Enrichment,
) -> Result<ClientRecord<C>, QueryFault> {
    let block_hash = log.block_hash.filter(|_| enrichment.block);
    let transaction_hash = log.transaction_hash.filter(|_| enrichment.transaction);
    let receipt_hash = log.transaction_hash.filter(|_| enrichment.receipt);

    let block = async {
        match block_hash {
            Some(hash) => client.get_block_by_hash(hash).await.map(Some),
            None => Ok(None),
        }
    };
    let transaction = async {
        match transaction_hash {
            Some(hash) => client.get_transaction(hash).await.map(Some),
            None => Ok(None),
        }
    };
    let receipt = async {
        match receipt_hash {
            Some(hash) => client.get_transaction_receipt(hash).await.map(Some),
            None => Ok(None),
        }
    };

    let (block, transaction, receipt) = tokio::try_join!(block, transaction, receipt)?;
    Ok(LogRecord { log, block, transaction, receipt, source })
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256};

    use super::*;
    use crate::{
        EventFilter,
        test_utils::{MockChainClient, mock::Failure},
    };

    fn config(client: &MockChainClient) -> SyncConfig {
        SyncConfig::builder(
            EventFilter::new().contract_address(client.contract()).event_signature(client.event()),
        )
        .from_block(100)
        .batch_size(50)
        .build()
    }

    #[tokio::test]
    async fn resolves_head_and_plans_first_window() -> anyhow::Result<()> {
        let client = Arc::new(MockChainClient::new(250));
        client.emit(120);
        client.emit(160);

        let fetched = fetch_historical_window(&client, &config(&client), 100, None).await?;

        let Fetched::Window { range, head, records } = fetched else {
            panic!("expected a window, got {fetched:?}");
        };
        assert_eq!(range, 100..=149);
        assert_eq!(head, 250);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].block_number(), Some(120));
        assert_eq!(records[0].source, RecordSource::Historical);
        assert_eq!(client.log_queries(), vec![100..=149]);
        Ok(())
    }

    #[tokio::test]
    async fn start_past_ceiling_is_no_work() -> anyhow::Result<()> {
        let client = Arc::new(MockChainClient::new(250));

        let fetched = fetch_historical_window(&client, &config(&client), 251, Some(250)).await?;

        assert!(matches!(fetched, Fetched::NoWork { head: 250 }));
        assert!(client.log_queries().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn attaches_requested_details() -> anyhow::Result<()> {
        let client = Arc::new(MockChainClient::new(10));
        client.emit(5);
        let config = SyncConfig::builder(
            EventFilter::new().contract_address(client.contract()).event_signature(client.event()),
        )
        .block_data(true)
        .receipt_data(true)
        .build();

        let records = fetch_records(&client, &config, 0..=10, RecordSource::Live).await?;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.block.as_ref().map(|b| b.number), Some(5));
        assert!(record.transaction.is_none());
        assert_eq!(record.receipt.as_ref().map(|r| r.transaction_hash), record.transaction_hash());
        assert_eq!(record.source, RecordSource::Live);
        Ok(())
    }

    #[tokio::test]
    async fn keeps_ledger_order_across_concurrent_lookups() -> anyhow::Result<()> {
        let client = Arc::new(MockChainClient::new(10));
        for block in 1..=8 {
            client.emit(block);
        }
        let config = SyncConfig::builder(
            EventFilter::new().contract_address(client.contract()).event_signature(client.event()),
        )
        .transaction_data(true)
        .build();

        let records = fetch_records(&client, &config, 0..=10, RecordSource::Historical).await?;

        let blocks: Vec<_> = records.iter().filter_map(|r| r.block_number()).collect();
        assert_eq!(blocks, (1..=8).collect::<Vec<_>>());
        assert!(records.iter().all(|r| r.transaction.is_some()));
        Ok(())
    }

    #[tokio::test]
    async fn one_failed_lookup_fails_the_range() {
        let client = Arc::new(MockChainClient::new(10));
        client.emit(3);
        client.emit(4);
        client.fail_next(Failure::Receipt);
        let config = SyncConfig::builder(
            EventFilter::new().contract_address(client.contract()).event_signature(client.event()),
        )
        .receipt_data(true)
        .build();

        let result = fetch_records(&client, &config, 0..=10, RecordSource::Historical).await;

        assert!(matches!(result, Err(SyncError::Query(QueryFault::ReceiptNotFound(_)))));
    }

    #[tokio::test]
    async fn log_query_failure_surfaces_as_query_fault() {
        let client = Arc::new(MockChainClient::new(10));
        client.fail_next(Failure::Logs);

        let result =
            fetch_historical_window(&client, &config(&client), 0, Some(10)).await.map(|_| ());

        assert!(matches!(result, Err(SyncError::Query(QueryFault::Timeout))));
    }

    #[tokio::test]
    async fn logs_of_other_contracts_are_not_returned() -> anyhow::Result<()> {
        let client = Arc::new(MockChainClient::new(10));
        client.emit(2);
        let config = SyncConfig::builder(
            EventFilter::new()
                .contract_address(Address::with_last_byte(0x42))
                .event_signature(B256::with_last_byte(0x42)),
        )
        .build();

        let records = fetch_records(&client, &config, 0..=10, RecordSource::Historical).await?;

        assert!(records.is_empty());
        Ok(())
    }
}
