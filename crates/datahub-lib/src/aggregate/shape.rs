//! Post-aggregation sorting and limiting

use crate::models::{MetricSet, Sample};
use crate::query::{Order, QueryCondition};

/// Sort and limit applied in place to every series of an aggregate
///
/// Each series is shaped on its own, so two metric types of the same entity
/// can keep different time windows.
pub trait Shape {
    /// Stable sort of every series by timestamp
    fn sort_by_timestamp(&mut self, order: Order);

    /// Truncate every series to its first `limit` samples; 0 is a no-op
    fn limit(&mut self, limit: usize);

    /// Sort, then limit, per the query condition
    fn shape(&mut self, condition: &QueryCondition) {
        self.sort_by_timestamp(condition.order);
        if condition.is_limited() {
            self.limit(condition.limit);
        }
    }
}

pub(crate) fn sort_samples(samples: &mut [Sample], order: Order) {
    match order {
        Order::Asc => samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
        Order::Desc => samples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
    }
}

impl Shape for MetricSet {
    fn sort_by_timestamp(&mut self, order: Order) {
        for samples in self.series_mut() {
            sort_samples(samples, order);
        }
    }

    fn limit(&mut self, limit: usize) {
        if limit == 0 {
            return;
        }
        for samples in self.series_mut() {
            samples.truncate(limit);
        }
    }
}
