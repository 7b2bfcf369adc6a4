//! Per-partition processed-offset tracking.
//!
//! Workers finish messages out of order, so the position reported to the
//! broker must be guarded: a partition's offset is only ever raised.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

/// Highest processed offset per topic partition.
///
/// Safe to share between workers. Updates for all partitions go through one
/// lock, which also serializes the broker-side store done by
/// [`advance_with`](OffsetTracker::advance_with).
#[derive(Debug, Default)]
pub struct OffsetTracker {
    offsets: Mutex<HashMap<String, HashMap<i32, i64>>>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `offset` as processed. Returns `false` if an equal or higher
    /// offset was already recorded for the partition.
    pub fn advance(&self, topic: &str, partition: i32, offset: i64) -> bool {
        self.advance_with(topic, partition, offset, || Ok::<(), ()>(()))
            .unwrap_or(false)
    }

    /// Like [`advance`](Self::advance), but runs `store` first while holding
    /// the lock. The offset is only recorded if `store` succeeds, and `store`
    /// is skipped entirely when the offset would not move forward.
    pub fn advance_with<F, E>(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        store: F,
    ) -> Result<bool, E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let mut offsets = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);

        let current = offsets
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .copied();
        if matches!(current, Some(c) if c >= offset) {
            return Ok(false);
        }

        store()?;

        offsets
            .entry(topic.to_string())
            .or_default()
            .insert(partition, offset);
        Ok(true)
    }

    /// The highest processed offset for a partition.
    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .copied()
    }

    /// All tracked partitions, ordered by topic then partition.
    pub fn snapshot(&self) -> BTreeMap<TopicPartition, i64> {
        let offsets = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);
        offsets
            .iter()
            .flat_map(|(topic, partitions)| {
                partitions
                    .iter()
                    .map(move |(&partition, &offset)| (TopicPartition::new(topic.clone(), partition), offset))
            })
            .collect()
    }
}
