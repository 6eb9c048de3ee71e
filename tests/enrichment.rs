mod common;

use event_history::{
    Phase, QueryFault, SyncError, assert_phase, assert_records,
    test_utils::mock::{Failure, MockBlock, block_hash},
};

use crate::common::{setup, start};

#[tokio::test]
async fn attaches_block_transaction_and_receipt() -> anyhow::Result<()> {
    let (client, builder) = setup(20);
    let log = client.emit(10);

    let history = start(
        &client,
        builder.block_data(true).transaction_data(true).receipt_data(true),
    );

    let records = assert_records!(history.records(), count = 1);
    let record = &records[0];
    assert_eq!(record.block, Some(MockBlock { number: 10, hash: block_hash(10) }));
    let transaction = record.transaction.as_ref().expect("transaction attached");
    assert_eq!(Some(transaction.hash), log.transaction_hash);
    assert_eq!(transaction.block_number, 10);
    let receipt = record.receipt.as_ref().expect("receipt attached");
    assert_eq!(Some(receipt.transaction_hash), log.transaction_hash);
    assert!(receipt.status);
    Ok(())
}

#[tokio::test]
async fn only_requested_details_are_fetched() -> anyhow::Result<()> {
    let (client, builder) = setup(20);
    client.emit(10);
    client.fail_next(Failure::Transaction);

    let history = start(&client, builder.receipt_data(true));

    assert_phase!(history.phase(), Phase::CaughtUp);
    let records = assert_records!(history.records(), count = 1);
    assert!(records[0].block.is_none());
    assert!(records[0].transaction.is_none());
    assert!(records[0].receipt.is_some());
    Ok(())
}

#[tokio::test]
async fn failed_lookup_fails_the_window_until_refetched() -> anyhow::Result<()> {
    let (client, builder) = setup(20);
    client.emit(10);
    client.emit(11);
    client.fail_next(Failure::Receipt);

    let history = start(&client, builder.receipt_data(true));

    let mut error = history.error();
    let published = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        error.wait_for(|error| error.is_some()),
    )
    .await?
    .map(|error| error.clone())?;
    assert!(matches!(published, Some(SyncError::Query(QueryFault::ReceiptNotFound(_)))));
    assert!(history.records().borrow().is_empty());
    assert_eq!(*history.phase().borrow(), Phase::Backfilling);

    history.refetch();

    assert_phase!(history.phase(), Phase::CaughtUp);
    let records = assert_records!(history.records(), count = 2);
    assert!(records.iter().all(|record| record.receipt.is_some()));
    assert_eq!(client.log_queries(), vec![0..=20, 0..=20]);
    Ok(())
}
