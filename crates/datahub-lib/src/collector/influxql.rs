//! InfluxQL statement building

use crate::query::{Order, QueryCondition};
use crate::source::influxql_quote;
use chrono::{DateTime, Utc};

/// `SELECT * FROM <measurement>` with optional clauses
#[derive(Debug, Clone, Default)]
pub(crate) struct SelectStatement {
    measurement: String,
    predicates: Vec<String>,
    group_by: Option<String>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl SelectStatement {
    pub fn from(measurement: &str) -> Self {
        Self {
            measurement: measurement.to_string(),
            ..Self::default()
        }
    }

    /// `"tag" = 'value'`
    pub fn tag_eq(mut self, tag: &str, value: &str) -> Self {
        self.predicates
            .push(format!("\"{}\" = {}", tag, influxql_quote(value)));
        self
    }

    /// `"field" = true`
    pub fn bool_eq(mut self, field: &str, value: bool) -> Self {
        self.predicates.push(format!("\"{}\" = {}", field, value));
        self
    }

    /// `(("a" = 'x' AND "b" = 'y') OR ...)` over the given value pairs
    pub fn any_tag_pair(mut self, first: &str, second: &str, pairs: &[(&str, &str)]) -> Self {
        if pairs.is_empty() {
            return self;
        }
        let alternatives: Vec<String> = pairs
            .iter()
            .map(|(a, b)| {
                format!(
                    "(\"{}\" = {} AND \"{}\" = {})",
                    first,
                    influxql_quote(a),
                    second,
                    influxql_quote(b)
                )
            })
            .collect();
        self.predicates
            .push(format!("({})", alternatives.join(" OR ")));
        self
    }

    pub fn tag_eq_opt(self, tag: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.tag_eq(tag, value),
            None => self,
        }
    }

    pub fn time_after(mut self, t: DateTime<Utc>, inclusive: bool) -> Self {
        let op = if inclusive { ">=" } else { ">" };
        self.predicates.push(format!("time {} {}", op, nanos(t)));
        self
    }

    pub fn time_until(mut self, t: DateTime<Utc>) -> Self {
        self.predicates.push(format!("time <= {}", nanos(t)));
        self
    }

    pub fn group_by(mut self, clause: &str) -> Self {
        self.group_by = Some(clause.to_string());
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn build(&self) -> String {
        let mut statement = format!("SELECT * FROM \"{}\"", self.measurement);
        if !self.predicates.is_empty() {
            statement.push_str(" WHERE ");
            statement.push_str(&self.predicates.join(" AND "));
        }
        if let Some(group_by) = &self.group_by {
            statement.push_str(" GROUP BY ");
            statement.push_str(group_by);
        }
        if let Some(order) = self.order {
            statement.push(' ');
            statement.push_str(order.influxql());
        }
        if let Some(limit) = self.limit {
            statement.push_str(&format!(" LIMIT {}", limit));
        }
        statement
    }
}

/// Nanoseconds since the epoch, clamped to the representable range
fn nanos(t: DateTime<Utc>) -> i64 {
    match t.timestamp_nanos_opt() {
        Some(nanos) => nanos,
        None if t.timestamp() < 0 => i64::MIN,
        None => i64::MAX,
    }
}

/// Apply the prediction time window
///
/// Predictions look forward: a missing start means "from now". With no
/// bounds at all only the latest point of every series is selected.
pub(crate) fn prediction_window(
    statement: SelectStatement,
    condition: &QueryCondition,
    now: DateTime<Utc>,
) -> SelectStatement {
    match (condition.start_time, condition.end_time) {
        (None, None) => statement.group_by("*").order(Order::Desc).limit(1),
        (start, end) => {
            let statement = statement.time_after(start.unwrap_or(now), false);
            let statement = match end {
                Some(end) => statement.time_until(end),
                None => statement,
            };
            statement.order(condition.order)
        }
    }
}
