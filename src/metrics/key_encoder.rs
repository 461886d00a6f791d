//! Key encoding for metric storage
//!
//! Derives backend keys from a metric's base key and its dimension
//! assignment. Dimension values never contain `=`, so two distinct
//! assignments can never serialize to the same key.
//!
//! Examples:
//! - `analytics:tx_amount:coin=btc:category=deposit` (dimensional series)
//! - `analytics:visitors:d:2024-01-15` (daily cardinality sketch)
//! - `analytics:signups:bloom` (first-seen filter)

use crate::backend::Aggregation;
use crate::error::{AnalyticsError, Result};
use crate::time::{Bucket, DateRange};
use chrono::{DateTime, Utc};

/// Separates the name and value of a dimension segment
pub const ASSIGNMENT_DELIMITER: char = '=';

/// Separates key segments
pub const SEGMENT_DELIMITER: char = ':';

/// Encodes and decodes metric keys
pub struct MetricKeyEncoder;

impl MetricKeyEncoder {
    /// Reject empty identifiers and identifiers containing `=`
    pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(AnalyticsError::invalid_identifier(field, value, "must not be empty"));
        }
        if value.contains(ASSIGNMENT_DELIMITER) {
            return Err(AnalyticsError::invalid_identifier(
                field,
                value,
                "\"=\" is not allowed",
            ));
        }
        Ok(())
    }

    /// Format: `<prefix>:<suffix>`
    pub fn base_key(prefix: &str, suffix: &str) -> Result<String> {
        Self::validate_identifier("prefix", prefix)?;
        Self::validate_identifier("suffix", suffix)?;
        Ok(format!("{}{}{}", prefix, SEGMENT_DELIMITER, suffix))
    }

    /// Format: `<base>:<name>=<value>[:<name>=<value>]*`
    ///
    /// Segments keep the order they are given in. No assignments yields the
    /// base key itself.
    pub fn build_key<'a, I>(base_key: &str, assignments: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut key = base_key.to_string();
        for (name, value) in assignments {
            key.push(SEGMENT_DELIMITER);
            key.push_str(name);
            key.push(ASSIGNMENT_DELIMITER);
            key.push_str(value);
        }
        key
    }

    /// Recover `(name, value)` pairs from a key built on `base_key`
    pub fn decode_dimensions(base_key: &str, key: &str) -> Option<Vec<(String, String)>> {
        let rest = key.strip_prefix(base_key)?;
        if rest.is_empty() {
            return Some(Vec::new());
        }
        let rest = rest.strip_prefix(SEGMENT_DELIMITER)?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        for part in rest.split(SEGMENT_DELIMITER) {
            match part.split_once(ASSIGNMENT_DELIMITER) {
                Some((name, value)) => pairs.push((name.to_string(), value.to_string())),
                // values may contain ':'
                None => {
                    let (_, value) = pairs.last_mut()?;
                    value.push(SEGMENT_DELIMITER);
                    value.push_str(part);
                }
            }
        }
        Some(pairs)
    }

    /// Format: `<key>:<code>:<bucket key>`, e.g. `visitors:h:2024-01-15:13`
    pub fn hll_bucket_key(key: &str, bucket: Bucket, at: DateTime<Utc>) -> String {
        format!("{}:{}:{}", key, bucket.code(), bucket.format_key(at))
    }

    /// Format: `<key>:all`
    pub fn hll_lifetime_key(key: &str) -> String {
        format!("{}:all", key)
    }

    /// Format: `<key>:snap:<code>:<start_ms>-<end_ms>`
    pub fn hll_snapshot_key(key: &str, bucket: Bucket, range: &DateRange) -> String {
        format!(
            "{}:snap:{}:{}-{}",
            key,
            bucket.code(),
            range.start_ms(),
            range.end_ms()
        )
    }

    /// Format: `<base>:bloom`
    pub fn bloom_key(base_key: &str) -> String {
        format!("{}:bloom", base_key)
    }

    /// Format: `<base>:count`
    pub fn count_key(base_key: &str) -> String {
        format!("{}:count", base_key)
    }

    /// Format: `<key>:<AGGREGATION>`
    pub fn compaction_key(key: &str, aggregation: Aggregation) -> String {
        format!("{}:{}", key, aggregation.as_str())
    }
}
