//! Fixed-size partitioning of purchase records into linking batches.
//!
//! A batch is a borrowed, contiguous slice of the purchase record set. It has
//! no identity beyond its index and only lives for one linking run.

use crate::dataset::RecordSet;
use crate::primitives::TRANSACTION_NUMBER;
use crate::{Record, Value};

/// A contiguous slice of purchase rows processed as one unit of work.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Position of this batch in the partition.
    pub index: usize,
    /// Purchase rows of this batch.
    pub rows: &'a [Record],
}

impl Batch<'_> {
    /// Number of purchases in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no purchases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Transaction number of the first purchase.
    #[must_use]
    pub fn first_transaction(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(TRANSACTION_NUMBER))
    }

    /// Transaction number of the last purchase.
    #[must_use]
    pub fn last_transaction(&self) -> Option<&Value> {
        self.rows.last().and_then(|r| r.get(TRANSACTION_NUMBER))
    }
}

/// Split `records` into batches of at most `size` rows, in input order.
///
/// Yields `ceil(len / size)` batches; a `size` of zero is treated as one.
#[must_use]
pub fn partition(records: &RecordSet, size: usize) -> Vec<Batch<'_>> {
    records
        .rows()
        .chunks(size.max(1))
        .enumerate()
        .map(|(index, rows)| Batch { index, rows })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchases(n: usize) -> RecordSet {
        let rows = (0..n)
            .map(|i| [(TRANSACTION_NUMBER, Value::text(format!("t{i}")))].into_iter().collect())
            .collect();
        RecordSet::from_rows(vec![TRANSACTION_NUMBER.to_string()], rows)
    }

    #[test]
    fn batch_count_is_ceiling() {
        assert_eq!(partition(&purchases(0), 10).len(), 0);
        assert_eq!(partition(&purchases(10), 10).len(), 1);
        assert_eq!(partition(&purchases(11), 10).len(), 2);
        assert_eq!(partition(&purchases(25_001), 10_000).len(), 3);
    }

    #[test]
    fn last_batch_holds_remainder() {
        let set = purchases(23);
        let batches = partition(&set, 10);

        assert_eq!(batches[2].len(), 3);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[2].first_transaction(), Some(&Value::text("t20")));
        assert_eq!(batches[2].last_transaction(), Some(&Value::text("t22")));
    }

    #[test]
    fn zero_size_does_not_loop() {
        assert_eq!(partition(&purchases(3), 0).len(), 3);
    }
}
