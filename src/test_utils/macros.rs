/// Waits until a phase observable reaches the expected [`Phase`](crate::Phase).
///
/// Panics if the phase is not reached within the timeout (default 5 seconds) or the subscription
/// stops publishing first.
#[macro_export]
macro_rules! assert_phase {
    ($phase: expr, $expected: expr) => {
        $crate::assert_phase!($phase, $expected, timeout = 5)
    };
    ($phase: expr, $expected: expr, timeout = $secs: expr) => {
        let expected: $crate::Phase = $expected;
        let mut receiver = $phase;
        let reached = tokio::time::timeout(
            std::time::Duration::from_secs($secs),
            receiver.wait_for(|phase| *phase == expected),
        )
        .await
        .map(|result| result.is_ok());
        match reached {
            Ok(true) => {}
            Ok(false) => panic!(
                "Expected phase {:?}, but the subscription stopped at {:?}",
                expected,
                *receiver.borrow()
            ),
            Err(_) => panic!(
                "Timed out waiting for phase {:?}, still at {:?}",
                expected,
                *receiver.borrow()
            ),
        }
    };
}

/// Waits until a records observable holds exactly `count` records and evaluates to them.
///
/// Panics on timeout (default 5 seconds), if the list overshoots `count`, or if the list is not
/// strictly descending by `(block_number, log_index)`.
#[macro_export]
macro_rules! assert_records {
    ($records: expr, count = $count: expr) => {
        $crate::assert_records!($records, count = $count, timeout = 5)
    };
    ($records: expr, count = $count: expr, timeout = $secs: expr) => {{
        let expected: usize = $count;
        let mut receiver = $records;
        let reached = tokio::time::timeout(
            std::time::Duration::from_secs($secs),
            receiver.wait_for(|records| records.len() >= expected),
        )
        .await
        .map(|result| result.map(|records| records.clone()));
        let records = match reached {
            Ok(Ok(records)) => records,
            Ok(Err(_)) => panic!(
                "Expected {} records, but the subscription stopped with {}",
                expected,
                receiver.borrow().len()
            ),
            Err(_) => panic!(
                "Timed out waiting for {} records, have {}",
                expected,
                receiver.borrow().len()
            ),
        };
        assert_eq!(records.len(), expected, "Expected {} records, got {}", expected, records.len());
        let positions: Vec<_> =
            records.iter().map(|record| (record.block_number(), record.log_index())).collect();
        assert!(
            positions.windows(2).all(|pair| pair[0] > pair[1]),
            "Records are not strictly descending: {:?}",
            positions
        );
        records
    }};
}
