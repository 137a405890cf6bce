//! Error taxonomy for the datahub engine

use thiserror::Error;

/// Text the metrics backend returns when a range query would produce more
/// points per series than it allows
pub const DECREASE_RESOLUTION_MESSAGE: &str = "Try decreasing the query resolution";

pub type Result<T> = std::result::Result<T, DatahubError>;

#[derive(Debug, Error)]
pub enum DatahubError {
    /// The requested time range and step exceed the backend's resolution limit.
    /// Callers should narrow the range or increase the step.
    #[error("query condition exceeds maximum: {0}")]
    QueryConditionExceedsMaximum(String),

    #[error("query {sub_source} for {entity} failed: {message}")]
    Upstream {
        entity: String,
        sub_source: String,
        message: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DatahubError {
    /// Classify a source failure for one entity and sub-source
    pub fn from_upstream(
        entity: impl Into<String>,
        sub_source: impl Into<String>,
        err: anyhow::Error,
    ) -> Self {
        // Alternate formatting includes the whole context chain
        let message = format!("{:#}", err);
        if message.contains(DECREASE_RESOLUTION_MESSAGE) {
            return DatahubError::QueryConditionExceedsMaximum(message);
        }

        DatahubError::Upstream {
            entity: entity.into(),
            sub_source: sub_source.into(),
            message,
        }
    }

    pub fn is_query_condition_exceeds_maximum(&self) -> bool {
        matches!(self, DatahubError::QueryConditionExceedsMaximum(_))
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            DatahubError::QueryConditionExceedsMaximum(_) => "query_condition_exceeds_maximum",
            DatahubError::Upstream { .. } => "upstream",
            DatahubError::InvalidArgument(_) => "invalid_argument",
            DatahubError::Internal(_) => "internal",
        }
    }
}
