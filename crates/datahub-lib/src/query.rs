//! Query condition normalization
//!
//! Callers hand in a loosely populated [`QueryParams`]. Every fetch and
//! shaping step downstream works from the canonical [`QueryCondition`].

use crate::error::{DatahubError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sort order over sample timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    /// InfluxQL `ORDER BY` clause for this order
    pub fn influxql(&self) -> &'static str {
        match self {
            Order::Asc => "ORDER BY time ASC",
            Order::Desc => "ORDER BY time DESC",
        }
    }
}

/// Caller supplied time range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Resolution step in seconds
    #[serde(default)]
    pub step_secs: Option<u64>,
}

impl TimeRange {
    /// Require a bounded, forward range
    ///
    /// The normalizer never calls this. Request handlers that need a bounded
    /// range run it before invoking the engine.
    pub fn validate(&self) -> Result<()> {
        let (start, end) = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(DatahubError::InvalidArgument(
                    "field \"start_time\" and \"end_time\" cannot be empty".to_string(),
                ))
            }
        };

        if start >= end {
            return Err(DatahubError::InvalidArgument(
                "\"end_time\" must be after \"start_time\"".to_string(),
            ));
        }

        Ok(())
    }
}

/// Optional caller parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub order: Option<Order>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl QueryParams {
    /// Validate that a bounded time range is present
    pub fn validate_time_range(params: Option<&QueryParams>) -> Result<()> {
        match params.and_then(|p| p.time_range.as_ref()) {
            Some(range) => range.validate(),
            None => Err(DatahubError::InvalidArgument(
                "field \"time_range\" cannot be empty".to_string(),
            )),
        }
    }
}

/// Canonical, immutable query condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCondition {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub step: Option<Duration>,
    pub order: Order,
    /// Maximum samples per series; 0 means unbounded
    pub limit: usize,
}

impl QueryCondition {
    /// Normalize optional caller parameters
    ///
    /// Missing input yields ascending order, no bounds and no limit. A
    /// non-positive limit means no limit.
    pub fn normalize(params: Option<&QueryParams>) -> Self {
        let Some(params) = params else {
            return Self::default();
        };

        let mut condition = Self {
            order: params.order.unwrap_or_default(),
            limit: params
                .limit
                .filter(|limit| *limit > 0)
                .and_then(|limit| usize::try_from(limit).ok())
                .unwrap_or(0),
            ..Self::default()
        };

        if let Some(range) = &params.time_range {
            condition.start_time = range.start_time;
            condition.end_time = range.end_time;
            condition.step = range
                .step_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs);
        }

        condition
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_range(
        mut self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Whether a limit applies
    pub fn is_limited(&self) -> bool {
        self.limit > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_normalize_none_is_default() {
        let condition = QueryCondition::normalize(None);
        assert_eq!(condition.order, Order::Asc);
        assert_eq!(condition.limit, 0);
        assert!(condition.start_time.is_none());
        assert!(condition.end_time.is_none());
        assert!(condition.step.is_none());
        assert!(!condition.is_limited());
    }

    #[test]
    fn test_normalize_missing_order_is_ascending() {
        let params = QueryParams {
            limit: Some(5),
            ..Default::default()
        };
        let condition = QueryCondition::normalize(Some(&params));
        assert_eq!(condition.order, Order::Asc);
        assert_eq!(condition.limit, 5);
    }

    #[test]
    fn test_normalize_non_positive_limit_is_unbounded() {
        for limit in [0, -1, i64::MIN] {
            let params = QueryParams {
                limit: Some(limit),
                ..Default::default()
            };
            assert_eq!(QueryCondition::normalize(Some(&params)).limit, 0);
        }
    }

    #[test]
    fn test_normalize_copies_independent_bounds() {
        let params = QueryParams {
            time_range: Some(TimeRange {
                start_time: None,
                end_time: Some(ts(100)),
                step_secs: Some(30),
            }),
            order: Some(Order::Desc),
            limit: None,
        };
        let condition = QueryCondition::normalize(Some(&params));
        assert_eq!(condition.start_time, None);
        assert_eq!(condition.end_time, Some(ts(100)));
        assert_eq!(condition.step, Some(Duration::from_secs(30)));
        assert_eq!(condition.order, Order::Desc);
    }

    #[test]
    fn test_normalize_does_not_validate() {
        // Reversed range passes through untouched
        let params = QueryParams {
            time_range: Some(TimeRange {
                start_time: Some(ts(200)),
                end_time: Some(ts(100)),
                step_secs: None,
            }),
            ..Default::default()
        };
        let condition = QueryCondition::normalize(Some(&params));
        assert_eq!(condition.start_time, Some(ts(200)));
        assert_eq!(condition.end_time, Some(ts(100)));
    }

    #[test]
    fn test_time_range_validation() {
        let valid = TimeRange {
            start_time: Some(ts(1)),
            end_time: Some(ts(2)),
            step_secs: None,
        };
        assert!(valid.validate().is_ok());

        let reversed = TimeRange {
            start_time: Some(ts(2)),
            end_time: Some(ts(2)),
            step_secs: None,
        };
        assert!(matches!(
            reversed.validate(),
            Err(DatahubError::InvalidArgument(_))
        ));

        let open = TimeRange {
            start_time: Some(ts(1)),
            ..Default::default()
        };
        assert!(open.validate().is_err());
        assert!(QueryParams::validate_time_range(None).is_err());
    }

    #[test]
    fn test_params_deserialize_from_json() {
        let params: QueryParams = serde_json::from_str(
            r#"{"time_range":{"start_time":"2024-01-01T00:00:00Z","step_secs":60},"order":"desc","limit":10}"#,
        )
        .unwrap();
        let condition = QueryCondition::normalize(Some(&params));
        assert_eq!(condition.order, Order::Desc);
        assert_eq!(condition.limit, 10);
        assert_eq!(condition.step, Some(Duration::from_secs(60)));
    }
}
