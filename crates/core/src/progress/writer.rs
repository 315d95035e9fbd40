use std::sync::Arc;

use tokio::sync::mpsc;

use super::{ProgressEnvelope, ProgressHandle, ProgressRecord, ProgressStore};

/// Background task that drains progress events into storage
pub struct ProgressWriter {
    rx: mpsc::Receiver<ProgressEnvelope>,
    store: Arc<dyn ProgressStore>,
}

impl ProgressWriter {
    pub fn new(rx: mpsc::Receiver<ProgressEnvelope>, store: Arc<dyn ProgressStore>) -> Self {
        Self { rx, store }
    }

    /// Run until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Progress writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = ProgressRecord {
                id: 0,
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                job_id: envelope.event.job_id().map(String::from),
                task_id: envelope.event.task_id().map(String::from),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write progress event: {}", e);
            }
        }

        tracing::info!("Progress writer shutting down");
    }
}

/// Create a progress sink.
///
/// Spawn the returned writer with `tokio::spawn(writer.run())` and clone the
/// handle into every component that reports progress.
pub fn create_progress_system(
    store: Arc<dyn ProgressStore>,
    buffer_size: usize,
) -> (ProgressHandle, ProgressWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ProgressHandle::new(tx), ProgressWriter::new(rx, store))
}
