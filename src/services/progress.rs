//! Progress fan-out for analysis runs
//!
//! The worker reports every stage transition to a list of
//! [`ProgressObserver`]s. Delivery is best effort: an observer error is
//! logged by the worker and never fails the run.

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::domain::progress::{ProgressEvent, ProgressStatus};

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Progress delivery failed: {0}")]
    Delivery(String),
}

/// Receives progress notifications; called synchronously from the worker
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError>;
}

// ============================================================================
// Broadcast hub
// ============================================================================

/// In-process fan-out of progress events to SSE subscribers
#[derive(Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Live events for one job. Events dropped by a lagging subscriber are
    /// skipped rather than ending the stream.
    pub fn job_stream(&self, job_id: Uuid) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(move |message| match message {
            Ok(event) if event.job_id == job_id => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(job_id = %job_id, skipped, "Progress subscriber lagged");
                None
            }
        })
    }
}

impl ProgressObserver for ProgressHub {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError> {
        // No subscribers is normal: nobody is watching this run
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|e| ObserverError::Delivery(e.to_string()))
    }
}

// ============================================================================
// Tracing observer
// ============================================================================

/// Writes each progress event to the log
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, event: &ProgressEvent) -> Result<(), ObserverError> {
        match event.status {
            ProgressStatus::Failed => tracing::warn!(
                job_id = %event.job_id,
                stage = %event.rule_name,
                progress = event.progress,
                error = event.error.as_deref().unwrap_or(""),
                "{}",
                event.message
            ),
            _ => tracing::debug!(
                job_id = %event.job_id,
                stage = %event.rule_name,
                status = %event.status,
                progress = event.progress,
                "{}",
                event.message
            ),
        }
        Ok(())
    }
}
