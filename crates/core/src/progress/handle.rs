use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::ProgressEvent;

/// Envelope wrapping a progress event with its emission time
#[derive(Debug, Clone)]
pub struct ProgressEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: ProgressEvent,
}

/// Handle for emitting progress events
///
/// Cheaply cloneable. Delivery is best effort: a full or closed channel is
/// logged and never reported back to the emitter.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: mpsc::Sender<ProgressEnvelope>,
}

impl ProgressHandle {
    pub fn new(tx: mpsc::Sender<ProgressEnvelope>) -> Self {
        Self { tx }
    }

    fn envelope(event: ProgressEvent) -> ProgressEnvelope {
        ProgressEnvelope {
            timestamp: Utc::now(),
            event,
        }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.tx.send(Self::envelope(event)).await {
            tracing::error!("Failed to emit progress event: {}", e);
        }
    }

    /// Emit an event without waiting.
    ///
    /// Returns true if the event was queued.
    pub fn try_emit(&self, event: ProgressEvent) -> bool {
        match self.tx.try_send(Self::envelope(event)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropped progress event: {}", e);
                false
            }
        }
    }
}

/// Emit through an optional handle.
pub(crate) async fn emit(handle: &Option<ProgressHandle>, event: ProgressEvent) {
    if let Some(handle) = handle {
        handle.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped() -> ProgressEvent {
        ProgressEvent::ServiceStopped {
            reason: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_emit_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = ProgressHandle::new(tx);

        handle
            .emit(ProgressEvent::JobCreated {
                job_id: "j-1".to_string(),
                public_id: "job_12345678".to_string(),
                owner: "alice".to_string(),
                total: 2,
            })
            .await;

        let envelope = rx.recv().await.expect("Should receive event");
        assert!(matches!(envelope.event, ProgressEvent::JobCreated { total: 2, .. }));
    }

    #[test]
    fn test_try_emit_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ProgressHandle::new(tx);

        assert!(handle.try_emit(stopped()));
        // Channel full: dropped, not an error for the caller
        assert!(!handle.try_emit(stopped()));
    }

    #[tokio::test]
    async fn test_emit_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel::<ProgressEnvelope>(10);
        let handle = ProgressHandle::new(tx);
        drop(rx);

        handle.emit(stopped()).await;
        assert!(!handle.try_emit(stopped()));
    }

    #[tokio::test]
    async fn test_emit_through_missing_handle_is_noop() {
        emit(&None, stopped()).await;
    }
}
