//! Bucket-start enumeration

use super::bucket::{floor_to_bucket, step};
use super::types::{Bucket, DateRange};
use chrono::{DateTime, Utc};

/// Ascending bucket starts below `range.end`
///
/// Finite and lazy. Each call to `generate_time_series` builds a fresh
/// iterator; an exhausted one is not restarted.
#[derive(Debug, Clone)]
pub struct BucketSeries {
    next: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    bucket: Bucket,
}

impl Iterator for BucketSeries {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        if current >= self.end {
            self.next = None;
            return None;
        }
        let following = step(current, self.bucket);
        // Guard against a step that fails to advance at the calendar limits
        self.next = (following > current).then_some(following);
        Some(current)
    }
}

/// Bucket starts from the bucket containing `range.start` up to `range.end`
pub fn generate_time_series(range: &DateRange, bucket: Bucket) -> BucketSeries {
    let next = if range.is_empty() {
        None
    } else {
        Some(floor_to_bucket(range.start, bucket))
    };
    BucketSeries {
        next,
        end: range.end,
        bucket,
    }
}
