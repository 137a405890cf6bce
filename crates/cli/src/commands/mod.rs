//! CLI subcommands and the query flags they share

pub mod config;
pub mod health;
pub mod metrics;
pub mod predictions;
pub mod recommendations;

use chrono::{DateTime, Duration, Utc};
use clap::{Args, ValueEnum};
use datahub_lib::{Order, QueryParams, TimeRange};
use thiserror::Error;

/// Metric lists need a bounded range; this is the lookback when none is given
pub fn default_metrics_lookback() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid number in duration '{0}'")]
    InvalidNumber(String),
    #[error("unknown duration unit '{0}' (expected s, m, h, d or w)")]
    UnknownUnit(String),
    #[error("duration '{0}' is out of range")]
    OutOfRange(String),
}

/// Parse a duration such as `45s`, `30m`, `24h`, `7d` or `2w`
pub fn parse_duration(raw: &str) -> Result<Duration, DurationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DurationError::Empty);
    }

    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let amount: i64 = number
        .parse()
        .map_err(|_| DurationError::InvalidNumber(raw.to_string()))?;

    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        other => return Err(DurationError::UnknownUnit(other.to_string())),
    };
    duration.ok_or_else(|| DurationError::OutOfRange(raw.to_string()))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl From<SortOrder> for Order {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        }
    }
}

/// Time range, resolution, order and limit flags
#[derive(Debug, Clone, Default, Args)]
pub struct RangeArgs {
    /// Look back this far from now (e.g. 30m, 24h, 7d)
    #[arg(long, value_parser = parse_duration)]
    pub since: Option<Duration>,

    /// Look ahead this far from now (e.g. 1h); useful for predictions
    #[arg(long, value_parser = parse_duration)]
    pub until: Option<Duration>,

    /// Resolution step in seconds
    #[arg(long)]
    pub step: Option<u64>,

    /// Sort samples by time
    #[arg(long, value_enum)]
    pub order: Option<SortOrder>,

    /// Keep at most this many samples per series
    #[arg(long)]
    pub limit: Option<i64>,
}

impl RangeArgs {
    /// Query parameters relative to `now`; `None` when no flag was given
    pub fn to_query_params(
        &self,
        now: DateTime<Utc>,
        default_since: Option<Duration>,
    ) -> Result<Option<QueryParams>, DurationError> {
        let since = self.since.or(default_since);
        let start_time = since
            .map(|lookback| {
                now.checked_sub_signed(lookback)
                    .ok_or_else(|| DurationError::OutOfRange(format!("--since {lookback}")))
            })
            .transpose()?;
        let end_time = match self.until {
            Some(lookahead) => Some(
                now.checked_add_signed(lookahead)
                    .ok_or_else(|| DurationError::OutOfRange(format!("--until {lookahead}")))?,
            ),
            None => since.map(|_| now),
        };

        let time_range = (start_time.is_some() || end_time.is_some() || self.step.is_some())
            .then_some(TimeRange {
                start_time,
                end_time,
                step_secs: self.step,
            });

        if time_range.is_none() && self.order.is_none() && self.limit.is_none() {
            return Ok(None);
        }

        Ok(Some(QueryParams {
            time_range,
            order: self.order.map(Order::from),
            limit: self.limit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30m"), Ok(Duration::minutes(30)));
        assert_eq!(parse_duration("24h"), Ok(Duration::hours(24)));
        assert_eq!(parse_duration("7d"), Ok(Duration::days(7)));
        assert_eq!(parse_duration(" 45s "), Ok(Duration::seconds(45)));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert_eq!(
            parse_duration("h"),
            Err(DurationError::InvalidNumber("h".to_string()))
        );
        assert_eq!(
            parse_duration("10y"),
            Err(DurationError::UnknownUnit("y".to_string()))
        );
    }

    #[test]
    fn test_no_flags_means_no_condition() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(RangeArgs::default().to_query_params(now, None), Ok(None));
    }

    #[test]
    fn test_lookback_builds_bounded_range() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let args = RangeArgs {
            step: Some(60),
            order: Some(SortOrder::Desc),
            limit: Some(10),
            ..Default::default()
        };

        let params = args
            .to_query_params(now, Some(Duration::hours(1)))
            .unwrap()
            .unwrap();
        let range = params.time_range.unwrap();
        assert_eq!(range.start_time, Some(now - Duration::hours(1)));
        assert_eq!(range.end_time, Some(now));
        assert_eq!(range.step_secs, Some(60));
        assert_eq!(params.order, Some(Order::Desc));
        assert_eq!(params.limit, Some(10));
    }

    #[test]
    fn test_lookahead_leaves_start_open() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let args = RangeArgs {
            until: Some(Duration::hours(2)),
            ..Default::default()
        };

        let range = args
            .to_query_params(now, None)
            .unwrap()
            .unwrap()
            .time_range
            .unwrap();
        assert_eq!(range.start_time, None);
        assert_eq!(range.end_time, Some(now + Duration::hours(2)));
    }

    #[test]
    fn test_parse_duration_rejects_overflowing_amounts() {
        assert_eq!(
            parse_duration("9999999999999h"),
            Err(DurationError::OutOfRange("9999999999999h".to_string()))
        );
        assert!(parse_duration("9999999999999999w").is_err());
    }

    #[test]
    fn test_lookback_past_representable_time_is_an_error() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let args = RangeArgs {
            since: Some(parse_duration("99999999d").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            args.to_query_params(now, None),
            Err(DurationError::OutOfRange(_))
        ));

        let args = RangeArgs {
            until: Some(parse_duration("99999999d").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            args.to_query_params(now, None),
            Err(DurationError::OutOfRange(_))
        ));
    }
}
