use crate::source::record::{CounterRecord, Counters, COUNTER_COUNT, COUNTER_NAMES};
use chrono::NaiveDateTime;
use regex::Regex;
use std::num::ParseIntError;
use thiserror::Error;

/// Default grammar for gatekeeper "Basic measurements" lines.
///
/// Capture groups are positional: 1 is the lcore id, 2 the timestamp and
/// 3..=16 the counters in [`COUNTER_NAMES`] order. The occupancy percentage is
/// matched but not captured.
pub const DEFAULT_LINE_PATTERN: &str = concat!(
    r"^GK/(\d+)\s+(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2})\s+NOTICE\s+Basic\s+measurements\s+\[",
    r"tot_pkts_num\s+=\s+(\d+),\s+",
    r"tot_pkts_size\s+=\s+(\d+),\s+",
    r"pkts_num_granted\s+=\s+(\d+),\s+",
    r"pkts_size_granted\s+=\s+(\d+),\s+",
    r"pkts_num_request\s+=\s+(\d+),\s+",
    r"pkts_size_request\s+=\s+(\d+),\s+",
    r"pkts_num_declined\s+=\s+(\d+),\s+",
    r"pkts_size_declined\s+=\s+(\d+),\s+",
    r"tot_pkts_num_dropped\s+=\s+(\d+),\s+",
    r"tot_pkts_size_dropped\s+=\s+(\d+),\s+",
    r"tot_pkts_num_distributed\s+=\s+(\d+),\s+",
    r"tot_pkts_size_distributed\s+=\s+(\d+),\s+",
    r"flow_table_occupancy\s+=\s+(\d+)/(\d+)=\d+\.\d+%\]",
);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Positional groups a grammar must provide: lcore, timestamp, counters.
pub const REQUIRED_GROUPS: usize = 2 + COUNTER_COUNT;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("regex compilation failed: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("pattern has {found} capture groups, expected at least {expected}")]
    MissingGroups { expected: usize, found: usize },

    #[error("failed to parse timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("failed to parse lcore id '{value}': {source}")]
    SourceId {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("failed to parse counter {name} '{value}': {source}")]
    Counter {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Turns raw log lines into [`CounterRecord`]s.
#[derive(Debug, Clone)]
pub struct LineParser {
    pattern: Regex,
}

impl LineParser {
    /// Build a parser from an optional grammar override.
    ///
    /// `None` uses [`DEFAULT_LINE_PATTERN`]. An override must use the same
    /// positional capture group layout.
    pub fn new(pattern: Option<&str>) -> Result<Self, ParseError> {
        let regex = Regex::new(pattern.unwrap_or(DEFAULT_LINE_PATTERN))?;

        // captures_len counts the implicit whole-match group
        let found = regex.captures_len() - 1;
        if found < REQUIRED_GROUPS {
            return Err(ParseError::MissingGroups {
                expected: REQUIRED_GROUPS,
                found,
            });
        }

        Ok(Self { pattern: regex })
    }

    /// Parse one line.
    ///
    /// Returns `Ok(None)` for lines that do not follow the grammar; log files
    /// interleave plenty of those. A line that matches but carries a field
    /// that does not parse is an error.
    pub fn parse(&self, line: &str) -> Result<Option<CounterRecord>, ParseError> {
        let Some(captures) = self.pattern.captures(line) else {
            return Ok(None);
        };

        // Every group in the grammar is mandatory, so a match fills them all.
        let group = |i: usize| captures.get(i).map_or("", |m| m.as_str());

        let source_value = group(1);
        let source_id = source_value
            .parse::<u32>()
            .map_err(|source| ParseError::SourceId {
                value: source_value.to_string(),
                source,
            })?;

        let ts_value = group(2);
        let normalized = ts_value.split_whitespace().collect::<Vec<_>>().join(" ");
        let timestamp = NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT)
            .map_err(|source| ParseError::Timestamp {
                value: ts_value.to_string(),
                source,
            })?
            .and_utc();

        let mut counters = Counters::default();
        for (i, name) in COUNTER_NAMES.iter().copied().enumerate() {
            let value = group(i + 3);
            counters[i] = value.parse::<u64>().map_err(|source| ParseError::Counter {
                name,
                value: value.to_string(),
                source,
            })?;
        }

        Ok(Some(CounterRecord {
            source_id,
            timestamp,
            counters,
        }))
    }
}

/// Render a line in the default grammar. Used by tests across the crate.
#[cfg(test)]
pub(crate) fn format_line(lcore: u32, ts: &str, counters: &Counters) -> String {
    let v = counters.values();
    let pct = if v[13] == 0 {
        0.0
    } else {
        v[12] as f64 * 100.0 / v[13] as f64
    };
    format!(
        "GK/{lcore} {ts} NOTICE Basic measurements [tot_pkts_num = {}, tot_pkts_size = {}, \
         pkts_num_granted = {}, pkts_size_granted = {}, pkts_num_request = {}, \
         pkts_size_request = {}, pkts_num_declined = {}, pkts_size_declined = {}, \
         tot_pkts_num_dropped = {}, tot_pkts_size_dropped = {}, tot_pkts_num_distributed = {}, \
         tot_pkts_size_distributed = {}, flow_table_occupancy = {}/{}={pct:.1}%]",
        v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8], v[9], v[10], v[11], v[12], v[13]
    )
}
