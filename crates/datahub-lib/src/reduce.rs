//! Latest-sample reduction
//!
//! Collapses a series into the single most recent usable value per metric
//! type. This is the only place sample values are parsed as numbers.

use crate::models::{MetricSet, MetricType, Sample};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Parse a sample value as an integer, falling back to a float truncated
/// toward zero
///
/// Surrounding whitespace is not accepted.
pub fn parse_value(value: &str) -> Option<i64> {
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed);
    }

    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => Some(parsed.trunc() as i64),
        _ => None,
    }
}

/// Latest parseable value of one series
///
/// A later sample only replaces the current one if its timestamp is strictly
/// greater, so on ties the first sample seen wins.
pub fn latest_value(samples: &[Sample]) -> Option<i64> {
    let mut best: Option<(DateTime<Utc>, i64)> = None;

    for sample in samples {
        let Some(value) = parse_value(&sample.value) else {
            debug!(
                timestamp = %sample.timestamp,
                value = %sample.value,
                "Skipping sample with non-numeric value"
            );
            continue;
        };

        match best {
            Some((timestamp, _)) if sample.timestamp <= timestamp => {}
            _ => best = Some((sample.timestamp, value)),
        }
    }

    best.map(|(_, value)| value)
}

/// Latest value per requested metric type
///
/// Metric types with no series, or with no parseable sample, have no entry
/// in the result.
pub fn reduce_to_latest(series: &MetricSet, kinds: &[MetricType]) -> BTreeMap<MetricType, i64> {
    kinds
        .iter()
        .filter_map(|kind| {
            let samples = series.get(*kind)?;
            latest_value(samples).map(|value| (*kind, value))
        })
        .collect()
}
