use crate::error::{DatahubError, Result};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sending half handed to every worker
pub struct Emitter<R> {
    tx: mpsc::UnboundedSender<R>,
}

impl<R> Emitter<R> {
    /// Stream one record to the folding consumer
    pub fn emit(&self, record: R) -> Result<()> {
        self.tx
            .send(record)
            .map_err(|_| DatahubError::Internal("collector consumer stopped".to_string()))
    }
}

/// Concurrent fan-out over a set of targets
///
/// One task per target runs on a [`JoinSet`]. Workers stream records over a
/// shared unbounded channel to a single consumer task, which is the only
/// writer to the aggregate. The first worker error wins and the partial
/// aggregate is dropped.
#[derive(Debug, Clone, Copy)]
pub struct Collector {
    cancel_on_error: bool,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            cancel_on_error: true,
        }
    }
}

impl Collector {
    /// With `cancel_on_error`, the first failure cancels sibling workers;
    /// otherwise they run to completion and their output is discarded.
    pub fn new(cancel_on_error: bool) -> Self {
        Self { cancel_on_error }
    }

    pub async fn fan_out<T, R, M, W, Fut, F>(&self, targets: Vec<T>, worker: W, mut fold: F) -> Result<M>
    where
        R: Send + 'static,
        M: Default + Send + 'static,
        W: Fn(T, Emitter<R>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
        F: FnMut(&mut M, R) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<R>();

        let consumer = tokio::spawn(async move {
            let mut aggregate = M::default();
            while let Some(record) = rx.recv().await {
                fold(&mut aggregate, record);
            }
            aggregate
        });

        let token = CancellationToken::new();
        let mut workers = JoinSet::new();
        for target in targets {
            let task = worker(target, Emitter { tx: tx.clone() });
            let token = token.clone();
            workers.spawn(async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Ok(()),
                    result = task => result,
                }
            });
        }
        // Consumer stops once every worker has dropped its sender
        drop(tx);

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined
                .map_err(|e| DatahubError::Internal(format!("collector worker failed: {}", e)))
                .and_then(|result| result);

            if let Err(err) = outcome {
                if first_error.is_none() {
                    if self.cancel_on_error {
                        debug!(error = %err, "Cancelling sibling workers");
                        token.cancel();
                    }
                    first_error = Some(err);
                } else {
                    debug!(error = %err, "Discarding later worker error");
                }
            }
        }

        if let Some(err) = first_error {
            consumer.abort();
            return Err(err);
        }

        consumer
            .await
            .map_err(|e| DatahubError::Internal(format!("collector consumer failed: {}", e)))
    }
}
