use super::influxql::SelectStatement;
use crate::cluster::SimulatedSchedulingScore;
use crate::error::{DatahubError, Result};
use crate::observability::StructuredLogger;
use crate::query::QueryCondition;
use crate::source::{FieldValue, Point, Row, TimeSeriesStore, SCORE_DATABASE};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const MEASUREMENT: &str = "simulated_scheduling_score";

const FIELD_SCORE_BEFORE: &str = "score_before";
const FIELD_SCORE_AFTER: &str = "score_after";

/// Simulated scheduling scores kept in the score database
#[derive(Clone)]
pub struct ScoreDao {
    store: Arc<dyn TimeSeriesStore>,
    logger: StructuredLogger,
}

impl ScoreDao {
    pub fn new(store: Arc<dyn TimeSeriesStore>, logger: StructuredLogger) -> Self {
        Self { store, logger }
    }

    pub async fn list_simulated_scheduling_scores(
        &self,
        condition: &QueryCondition,
    ) -> Result<Vec<SimulatedSchedulingScore>> {
        let operation = "list_simulated_scheduling_scores";
        let started = Instant::now();
        self.logger.log_query_started(operation, 1);

        let mut statement = SelectStatement::from(MEASUREMENT);
        if let Some(start) = condition.start_time {
            statement = statement.time_after(start, true);
        }
        if let Some(end) = condition.end_time {
            statement = statement.time_until(end);
        }
        let query = statement
            .order(condition.order)
            .limit(condition.limit)
            .build();

        let rows = match self.store.query(&query, SCORE_DATABASE).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = DatahubError::from_upstream(SCORE_DATABASE, operation, e);
                self.logger.log_query_failed(operation, &err);
                return Err(err);
            }
        };

        let scores: Vec<SimulatedSchedulingScore> = rows.iter().filter_map(row_score).collect();
        self.logger.log_query_completed(
            operation,
            scores.len(),
            scores.len(),
            started.elapsed().as_millis(),
        );
        Ok(scores)
    }

    /// Store one point per score; returns the point count
    pub async fn create_simulated_scheduling_scores(
        &self,
        scores: &[SimulatedSchedulingScore],
    ) -> Result<usize> {
        let operation = "create_simulated_scheduling_scores";
        let points: Vec<Point> = scores
            .iter()
            .map(|score| {
                Point::new(MEASUREMENT, score.timestamp)
                    .field(FIELD_SCORE_BEFORE, FieldValue::Float(score.score_before))
                    .field(FIELD_SCORE_AFTER, FieldValue::Float(score.score_after))
            })
            .collect();

        let count = points.len();
        match self.store.write_points(SCORE_DATABASE, &points).await {
            Ok(()) => {
                self.logger.log_points_written(operation, SCORE_DATABASE, count);
                Ok(count)
            }
            Err(e) => {
                let err = DatahubError::from_upstream(SCORE_DATABASE, operation, e);
                self.logger.log_query_failed(operation, &err);
                Err(err)
            }
        }
    }
}

fn row_score(row: &Row) -> Option<SimulatedSchedulingScore> {
    let score = |column: &str| row.get(column).and_then(|raw| raw.parse::<f64>().ok());
    match (row.time(), score(FIELD_SCORE_BEFORE), score(FIELD_SCORE_AFTER)) {
        (Some(timestamp), Some(score_before), Some(score_after)) => Some(SimulatedSchedulingScore {
            timestamp,
            score_before,
            score_after,
        }),
        _ => {
            debug!(?row, "Skipping incomplete score row");
            None
        }
    }
}
