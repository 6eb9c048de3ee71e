use alloy::primitives::BlockNumber;
use std::ops::RangeInclusive;

/// Next historical window starting at `start`, at most `batch_size` blocks wide and never past
/// `hard_ceiling`.
///
/// Returns `None` when `start` is already beyond the ceiling, so callers never see an inverted
/// window.
///
/// # Panics
///
/// Panics if `batch_size` is 0.
#[must_use]
pub fn plan_window(
    start: BlockNumber,
    batch_size: u64,
    hard_ceiling: BlockNumber,
) -> Option<RangeInclusive<BlockNumber>> {
    assert!(batch_size >= 1, "batch_size must be at least 1");
    if start > hard_ceiling {
        return None;
    }
    let window_end = start.saturating_add(batch_size - 1).min(hard_ceiling);
    Some(start..=window_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(
        start: BlockNumber,
        batch_size: u64,
        ceiling: BlockNumber,
    ) -> Vec<RangeInclusive<BlockNumber>> {
        let mut windows = Vec::new();
        let mut next = Some(start);
        while let Some(window) = next.and_then(|start| plan_window(start, batch_size, ceiling)) {
            next = window.end().checked_add(1);
            windows.push(window);
        }
        windows
    }

    #[test]
    fn windows_cover_range_in_batches() {
        let windows = walk(100, 50, 250);
        assert_eq!(windows, vec![100..=149, 150..=199, 200..=249, 250..=250]);
    }

    #[test]
    fn single_window_when_batch_exceeds_range() {
        assert_eq!(plan_window(100, 500, 120), Some(100..=120));
    }

    #[test]
    fn exact_boundary() {
        let windows = walk(100, 50, 199);
        assert_eq!(windows, vec![100..=149, 150..=199]);
    }

    #[test]
    fn start_past_ceiling_means_no_work() {
        assert_eq!(plan_window(251, 50, 250), None);
        assert!(walk(300, 50, 250).is_empty());
    }

    #[test]
    fn single_block_range() {
        assert_eq!(plan_window(250, 50, 250), Some(250..=250));
    }

    #[test]
    fn batch_size_one() {
        let windows = walk(100, 1, 103);
        assert_eq!(windows, vec![100..=100, 101..=101, 102..=102, 103..=103]);
    }

    #[test]
    fn starting_from_genesis() {
        let windows = walk(0, 50, 100);
        assert_eq!(windows, vec![0..=49, 50..=99, 100..=100]);
    }

    #[test]
    fn saturates_at_max_block_number() {
        assert_eq!(plan_window(u64::MAX - 1, 10, u64::MAX), Some(u64::MAX - 1..=u64::MAX));
        let windows = walk(u64::MAX, 10, u64::MAX);
        assert_eq!(windows, vec![u64::MAX..=u64::MAX]);
    }

    #[test]
    fn window_end_never_precedes_start() {
        for start in 0..40 {
            for batch_size in 1..12 {
                if let Some(window) = plan_window(start, batch_size, 30) {
                    assert!(window.end() >= window.start());
                    assert!(*window.end() <= 30);
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "batch_size must be at least 1")]
    fn zero_batch_size_panics() {
        let _ = plan_window(100, 0, 200);
    }
}
