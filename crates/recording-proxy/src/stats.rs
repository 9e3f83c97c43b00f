//! The aggregator (§4.5): in-memory hour/day bucketing over a
//! [`StatsProjection`] slice read from storage. Deliberately avoids
//! dialect-specific SQL `GROUP BY` — truncation is a plain function over
//! `Vec<StatsProjection>`.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::storage::StatsProjection;

/// One bucket of aggregated traffic, ascending by `time_bucket`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub time_bucket: DateTime<Utc>,
    pub request_count: u32,
    pub llm_request_count: u32,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
}

/// Group `projections` by the hour each `timestamp` falls in.
pub fn hourly(projections: &[StatsProjection]) -> Vec<Bucket> {
    aggregate(projections, truncate_to_hour)
}

/// Group `projections` by the day each `timestamp` falls in.
pub fn daily(projections: &[StatsProjection]) -> Vec<Bucket> {
    aggregate(projections, truncate_to_day)
}

fn aggregate(
    projections: &[StatsProjection],
    truncate: impl Fn(DateTime<Utc>) -> DateTime<Utc>,
) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();

    for projection in projections {
        let bucket_time = truncate(projection.timestamp);
        match buckets.iter_mut().find(|b| b.time_bucket == bucket_time) {
            Some(bucket) => {
                bucket.request_count += 1;
                if projection.has_llm {
                    bucket.llm_request_count += 1;
                }
                bucket.total_input_tokens += projection.input_tokens;
                bucket.total_output_tokens += projection.output_tokens;
            }
            None => buckets.push(Bucket {
                time_bucket: bucket_time,
                request_count: 1,
                llm_request_count: projection.has_llm as u32,
                total_input_tokens: projection.input_tokens,
                total_output_tokens: projection.output_tokens,
            }),
        }
    }

    buckets.sort_by_key(|b| b.time_bucket);
    buckets
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

fn truncate_to_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&ts.date_naive().and_hms_opt(0, 0, 0).unwrap_or(ts.naive_utc()))
}
