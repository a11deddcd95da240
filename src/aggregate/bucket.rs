use crate::source::record::{CounterRecord, Counters};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One aggregated observation: per-lcore counters summed over an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub counters: Counters,
    /// Number of lcores that contributed.
    pub sources: usize,
}

/// Groups per-lcore records into reporting intervals.
///
/// Gatekeeper writes one line per lcore per interval, in no particular lcore
/// order and without any delimiter between intervals. An lcore id showing up
/// a second time is taken as the start of the next interval. If an lcore
/// skips an interval entirely the boundary is detected late; that
/// approximation is accepted.
#[derive(Debug, Default)]
pub struct BucketAggregator {
    bucket: HashMap<u32, CounterRecord>,
    /// Timestamp of the first record of the open bucket.
    opened_at: Option<DateTime<Utc>>,
}

impl BucketAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Returns the completed sample when `record` closes the
    /// open bucket.
    pub fn feed(&mut self, record: CounterRecord) -> Option<Sample> {
        let completed = if self.bucket.contains_key(&record.source_id) {
            self.flush()
        } else {
            None
        };

        self.opened_at.get_or_insert(record.timestamp);
        self.bucket.insert(record.source_id, record);
        completed
    }

    /// Close the open bucket, if it holds anything.
    pub fn flush(&mut self) -> Option<Sample> {
        let timestamp = self.opened_at.take()?;

        let mut counters = Counters::default();
        for record in self.bucket.values() {
            counters.accumulate(&record.counters);
        }
        let sources = self.bucket.len();
        self.bucket.clear();

        Some(Sample {
            timestamp,
            counters,
            sources,
        })
    }

    /// Number of lcores in the open bucket.
    pub fn pending(&self) -> usize {
        self.bucket.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::record::COUNTER_COUNT;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn record(source_id: u32, minute: i64, value: u64) -> CounterRecord {
        CounterRecord {
            source_id,
            timestamp: base() + Duration::minutes(minute),
            counters: Counters::new([value; COUNTER_COUNT]),
        }
    }

    fn run(records: Vec<CounterRecord>) -> Vec<Sample> {
        let mut aggregator = BucketAggregator::new();
        let mut samples: Vec<Sample> = records
            .into_iter()
            .filter_map(|r| aggregator.feed(r))
            .collect();
        samples.extend(aggregator.flush());
        samples
    }

    #[test]
    fn test_repeat_lcore_closes_bucket() {
        let mut aggregator = BucketAggregator::new();
        assert!(aggregator.feed(record(0, 0, 1)).is_none());
        assert!(aggregator.feed(record(1, 0, 2)).is_none());
        assert_eq!(aggregator.pending(), 2);

        let sample = aggregator.feed(record(0, 1, 4)).unwrap();
        assert_eq!(sample.timestamp, base());
        assert_eq!(sample.counters, Counters::new([3; COUNTER_COUNT]));
        assert_eq!(sample.sources, 2);
        assert_eq!(aggregator.pending(), 1);

        let last = aggregator.flush().unwrap();
        assert_eq!(last.timestamp, base() + Duration::minutes(1));
        assert_eq!(last.counters, Counters::new([4; COUNTER_COUNT]));
        assert!(aggregator.flush().is_none());
    }

    #[test]
    fn test_n_sources_b_buckets() {
        let sources = 4u32;
        let buckets = 5i64;

        let mut records = Vec::new();
        for b in 0..buckets {
            // rotate the emission order inside each interval
            for i in 0..sources {
                let lcore = (i + b as u32) % sources;
                records.push(record(lcore, b, (b as u64 + 1) * 10 + lcore as u64));
            }
        }

        let samples = run(records);
        assert_eq!(samples.len(), buckets as usize);
        for (b, sample) in samples.iter().enumerate() {
            let expected: u64 = (0..sources as u64).map(|l| (b as u64 + 1) * 10 + l).sum();
            assert_eq!(sample.timestamp, base() + Duration::minutes(b as i64));
            assert_eq!(sample.counters, Counters::new([expected; COUNTER_COUNT]));
            assert_eq!(sample.sources, sources as usize);
        }
    }

    #[test]
    fn test_no_records_no_samples() {
        assert!(run(vec![]).is_empty());
    }

    #[test]
    fn test_open_bucket_emitted_on_flush() {
        let samples = run(vec![record(0, 0, 1), record(1, 0, 1), record(2, 0, 1)]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].counters, Counters::new([3; COUNTER_COUNT]));
    }

    #[test]
    fn test_same_input_same_output() {
        let records = vec![
            record(2, 0, 7),
            record(0, 0, 3),
            record(1, 0, 5),
            record(0, 1, 1),
            record(2, 1, 9),
            record(2, 2, 4),
        ];
        assert_eq!(run(records.clone()), run(records));
    }

    #[test]
    fn test_sum_saturates() {
        let samples = run(vec![record(0, 0, u64::MAX), record(1, 0, 1)]);
        assert_eq!(samples[0].counters, Counters::new([u64::MAX; COUNTER_COUNT]));
    }
}
