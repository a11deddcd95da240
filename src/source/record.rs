use chrono::{DateTime, Utc};
use std::ops::{Index, IndexMut};

/// Number of counters reported on every measurement line.
pub const COUNTER_COUNT: usize = 14;

/// Counter names in the order they appear on a measurement line.
pub const COUNTER_NAMES: [&str; COUNTER_COUNT] = [
    "tot_pkts_num",
    "tot_pkts_size",
    "pkts_num_granted",
    "pkts_size_granted",
    "pkts_num_request",
    "pkts_size_request",
    "pkts_num_declined",
    "pkts_size_declined",
    "tot_pkts_num_dropped",
    "tot_pkts_size_dropped",
    "tot_pkts_num_distributed",
    "tot_pkts_size_distributed",
    "flow_table_occupancy_current",
    "flow_table_occupancy_max",
];

/// Fixed set of named unsigned counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters([u64; COUNTER_COUNT]);

impl Counters {
    pub fn new(values: [u64; COUNTER_COUNT]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[u64; COUNTER_COUNT] {
        &self.0
    }

    /// Look up a counter by its exported name.
    pub fn get(&self, name: &str) -> Option<u64> {
        COUNTER_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    /// Iterate `(name, value)` pairs in line order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        COUNTER_NAMES.iter().copied().zip(self.0.iter().copied())
    }

    /// Element-wise add, saturating at `u64::MAX` instead of wrapping.
    pub fn accumulate(&mut self, other: &Counters) {
        for (acc, v) in self.0.iter_mut().zip(other.0.iter()) {
            *acc = acc.saturating_add(*v);
        }
    }
}

impl Index<usize> for Counters {
    type Output = u64;

    fn index(&self, index: usize) -> &u64 {
        &self.0[index]
    }
}

impl IndexMut<usize> for Counters {
    fn index_mut(&mut self, index: usize) -> &mut u64 {
        &mut self.0[index]
    }
}

/// One parsed measurement line from a single lcore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub source_id: u32,
    pub timestamp: DateTime<Utc>,
    pub counters: Counters,
}
