mod common;

use std::time::Duration;

use alloy::primitives::Address;
use event_history::{FetchStatus, Phase, RecordSource, assert_phase, assert_records};

use crate::common::{assert_contiguous, setup, start};

#[tokio::test]
async fn replays_history_in_windows_then_catches_up() -> anyhow::Result<()> {
    let (client, builder) = setup(250);
    client.emit(120);
    client.emit(180);
    client.emit(250);

    let history = start(&client, builder.from_block(100).batch_size(50));

    assert_phase!(history.phase(), Phase::CaughtUp);
    let records = assert_records!(history.records(), count = 3);
    assert_eq!(client.log_queries(), vec![100..=149, 150..=199, 200..=249, 250..=250]);
    assert_eq!(records[0].block_number(), Some(250));
    assert_eq!(records[2].block_number(), Some(120));
    assert!(records.iter().all(|record| record.source == RecordSource::Historical));
    assert_eq!(*history.status().borrow(), FetchStatus::Success);
    assert!(history.error().borrow().is_none());
    assert!(!*history.is_fetching().borrow());
    Ok(())
}

#[tokio::test]
async fn windows_leave_no_gap_for_any_batch_size() -> anyhow::Result<()> {
    for batch_size in [1, 7, 50, 121, 1_000] {
        let (client, builder) = setup(120);
        for block in [0, 6, 7, 49, 50, 119, 120] {
            client.emit(block);
        }

        let history = start(&client, builder.batch_size(batch_size));

        assert_phase!(history.phase(), Phase::CaughtUp);
        assert_records!(history.records(), count = 7);
        let queries = client.log_queries();
        assert_contiguous(&queries, 0, 120);
        assert!(
            queries.iter().all(|range| range.end() - range.start() < batch_size),
            "Window wider than {batch_size}: {queries:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn to_block_caps_the_replay() -> anyhow::Result<()> {
    let (client, builder) = setup(250);
    client.emit(150);
    client.emit(181);

    let history = start(&client, builder.from_block(100).to_block(180).batch_size(50));

    assert_phase!(history.phase(), Phase::CaughtUp);
    assert_records!(history.records(), count = 1);
    assert_eq!(client.log_queries(), vec![100..=149, 150..=180]);
    Ok(())
}

#[tokio::test]
async fn deployment_block_is_the_default_start() -> anyhow::Result<()> {
    let (client, builder) = setup(40);
    client.emit(5);
    client.emit(30);

    let history = start(&client, builder.deployed_at(20));

    assert_phase!(history.phase(), Phase::CaughtUp);
    assert_records!(history.records(), count = 1);
    assert_eq!(client.log_queries(), vec![20..=40]);
    Ok(())
}

#[tokio::test]
async fn start_beyond_the_head_catches_up_without_querying_logs() -> anyhow::Result<()> {
    let (client, builder) = setup(10);

    let history = start(&client, builder.from_block(11));

    assert_phase!(history.phase(), Phase::CaughtUp);
    assert!(client.log_queries().is_empty());
    assert!(history.records().borrow().is_empty());
    assert_eq!(*history.status().borrow(), FetchStatus::Success);
    Ok(())
}

#[tokio::test]
async fn records_are_newest_first_within_and_across_blocks() -> anyhow::Result<()> {
    let (client, builder) = setup(100);
    client.emit(10);
    client.emit(10);
    client.emit(60);
    client.emit(60);
    client.emit(60);

    let history = start(&client, builder.batch_size(30));

    let records = assert_records!(history.records(), count = 5);
    let positions: Vec<_> =
        records.iter().map(|record| (record.block_number(), record.log_index())).collect();
    assert_eq!(
        positions,
        vec![
            (Some(60), Some(2)),
            (Some(60), Some(1)),
            (Some(60), Some(0)),
            (Some(10), Some(1)),
            (Some(10), Some(0)),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn duplicate_logs_are_delivered_once() -> anyhow::Result<()> {
    let (client, builder) = setup(100);
    let log = client.emit(42);
    client.push_log(log.clone());
    client.push_log(log);
    client.emit(43);

    let history = start(&client, builder);

    assert_phase!(history.phase(), Phase::CaughtUp);
    let records = assert_records!(history.records(), count = 2);
    assert_eq!(records[1].block_number(), Some(42));
    Ok(())
}

#[tokio::test]
async fn logs_of_other_contracts_are_ignored() -> anyhow::Result<()> {
    let (client, builder) = setup(100);
    client.emit(10);
    client.emit_from(Address::with_last_byte(7), 11);

    let history = start(&client, builder);

    assert_phase!(history.phase(), Phase::CaughtUp);
    let records = assert_records!(history.records(), count = 1);
    assert_eq!(records[0].address(), client.contract());
    Ok(())
}

#[tokio::test]
async fn caught_up_history_does_not_follow_the_head() -> anyhow::Result<()> {
    let (client, builder) = setup(100);

    let history = start(&client, builder);
    assert_phase!(history.phase(), Phase::CaughtUp);

    client.emit(101);
    client.advance_head_to(101);
    history.refetch();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.log_queries(), vec![0..=100]);
    assert_eq!(client.head_subscriber_count(), 0);
    assert_eq!(*history.phase().borrow(), Phase::CaughtUp);
    Ok(())
}
