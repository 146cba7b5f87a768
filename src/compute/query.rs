//! Overlap queries over a single geohash bucket.
//!
//! A record matches a window when both its height interval and its time
//! interval share at least one point with the window's. Intervals are closed,
//! so touching endpoints count as overlap.

use geocell_types::{QueryResult, QueryWindow, Record};

/// Closed-interval overlap test: `[a_min, a_max]` and `[b_min, b_max]` share a point.
///
/// # Examples
///
/// ```
/// use geocell::compute::query::intervals_overlap;
///
/// assert!(intervals_overlap(100, 200, 150, 160));
/// assert!(intervals_overlap(100, 200, 50, 100));
/// assert!(!intervals_overlap(100, 200, 300, 400));
/// ```
#[inline]
pub fn intervals_overlap(a_min: i64, a_max: i64, b_min: i64, b_max: i64) -> bool {
    a_min <= b_max && a_max >= b_min
}

/// Whether `record` overlaps `window` in height and in time.
#[inline]
pub fn overlaps(record: &Record, window: &QueryWindow) -> bool {
    intervals_overlap(
        record.min_height,
        record.max_height,
        window.min_height,
        window.max_height,
    ) && intervals_overlap(
        record.start_time,
        record.end_time,
        window.start_time,
        window.end_time,
    )
}

/// Records of `bucket` overlapping `window`, in bucket order.
pub fn matching<'a>(
    bucket: &'a [Record],
    window: &'a QueryWindow,
) -> impl Iterator<Item = &'a Record> + 'a {
    bucket.iter().filter(move |record| overlaps(record, window))
}

/// Project the overlapping records of `bucket` into parallel result sequences.
pub fn project(bucket: &[Record], window: &QueryWindow) -> QueryResult {
    matching(bucket, window).collect()
}

/// Number of records of `bucket` overlapping `window`.
pub fn count(bucket: &[Record], window: &QueryWindow) -> usize {
    matching(bucket, window).count()
}
