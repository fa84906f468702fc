//! Merging per-indexer result sequences.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::CanonicalResult;

/// Merge sequences already sorted by descending publish date.
///
/// Stable: on equal timestamps, earlier sequences come first and each
/// sequence keeps its own order.
pub fn merge_by_publish_date(sequences: Vec<Vec<CanonicalResult>>) -> Vec<CanonicalResult> {
    let total = sequences.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);

    let mut iters: Vec<_> = sequences
        .into_iter()
        .map(|s| s.into_iter().peekable())
        .collect();

    let mut heap = BinaryHeap::with_capacity(iters.len());
    for (i, iter) in iters.iter_mut().enumerate() {
        if let Some(head) = iter.peek() {
            heap.push((head.publish_date, Reverse(i)));
        }
    }

    while let Some((_, Reverse(i))) = heap.pop() {
        if let Some(result) = iters[i].next() {
            merged.push(result);
        }
        if let Some(head) = iters[i].peek() {
            heap.push((head.publish_date, Reverse(i)));
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, hour, 0, 0).unwrap()
    }

    fn titles(results: &[CanonicalResult]) -> Vec<&str> {
        results.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_by_publish_date(vec![]).is_empty());
        assert!(merge_by_publish_date(vec![vec![], vec![]]).is_empty());
    }

    #[test]
    fn test_merge_interleaves() {
        let a = vec![fixtures::result("a9", at(9)), fixtures::result("a3", at(3))];
        let b = vec![
            fixtures::result("b7", at(7)),
            fixtures::result("b5", at(5)),
            fixtures::result("b1", at(1)),
        ];
        let merged = merge_by_publish_date(vec![a, b]);
        assert_eq!(titles(&merged), vec!["a9", "b7", "b5", "a3", "b1"]);
    }

    #[test]
    fn test_merge_ties_prefer_earlier_sequence() {
        let a = vec![fixtures::result("a1", at(5)), fixtures::result("a2", at(5))];
        let b = vec![fixtures::result("b1", at(5))];
        let c = vec![fixtures::result("c1", at(6))];
        let merged = merge_by_publish_date(vec![a, b, c]);
        assert_eq!(titles(&merged), vec!["c1", "a1", "a2", "b1"]);
    }
}
