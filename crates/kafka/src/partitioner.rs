//! Topic and partition selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use workload_core::{Error, Result};

/// Computes a partition key hash for consistent routing.
pub fn partition_hash(key: &str, num_partitions: i32) -> i32 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    (hash % num_partitions as u64) as i32
}

/// Cycles through a fixed sequence in order, wrapping after the last item.
#[derive(Debug, Clone)]
pub struct RoundRobin<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> RoundRobin<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }

    /// Returns the item at the cursor, then advances the cursor by one.
    pub fn next_item(&mut self) -> Result<&T> {
        if self.items.is_empty() {
            return Err(Error::configuration("round-robin sequence is empty"));
        }
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.items.len();
        Ok(&self.items[index])
    }

    /// Item the next call to [`next_item`](Self::next_item) will return.
    pub fn current(&self) -> Option<&T> {
        self.items.get(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Partition strategy within a topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Per-topic counter over all partitions
    #[default]
    RoundRobin,
    /// Hash of the message key
    ByKey,
}

/// Chooses the partition for each record.
#[derive(Debug)]
pub struct PartitionSelector {
    strategy: PartitionStrategy,
    partitions: i32,
    next: BTreeMap<String, i32>,
}

impl PartitionSelector {
    pub fn new(strategy: PartitionStrategy, partitions: i32) -> Self {
        Self {
            strategy,
            partitions: partitions.max(1),
            next: BTreeMap::new(),
        }
    }

    pub fn select(&mut self, topic: &str, key: &str) -> i32 {
        match self.strategy {
            PartitionStrategy::ByKey => partition_hash(key, self.partitions),
            PartitionStrategy::RoundRobin => {
                let slot = self.next.entry(topic.to_string()).or_insert(0);
                let partition = *slot;
                *slot = (partition + 1) % self.partitions;
                partition
            }
        }
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    pub fn reset(&mut self) {
        self.next.clear();
    }
}
