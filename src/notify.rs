//! Notification sink boundary
//!
//! Fire-and-forget operator notifications on order placement, failures,
//! cancellations and take-profit / stop-loss triggers. Delivery failures are
//! logged and never propagate back into trading logic.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};

use crate::errors::Result;

/// Kind of operator notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderPlaced,
    /// A known trading failure (rejected reservation, exhausted retries)
    OrderFailed,
    OrderCancelled,
    /// An unexpected error, distinct from known trading failures
    ErrorOccurred,
    TakeProfitTriggered,
    StopLossTriggered,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "Order placed",
            NotificationKind::OrderFailed => "Order failed",
            NotificationKind::OrderCancelled => "Order cancelled",
            NotificationKind::ErrorOccurred => "Error occurred",
            NotificationKind::TakeProfitTriggered => "Take profit triggered",
            NotificationKind::StopLossTriggered => "Stop loss triggered",
        }
    }
}

/// Delivery backend for notifications (implemented by collaborators)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, kind: NotificationKind, details: &str) -> Result<()>;
}

/// Sink that writes notifications to the log
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, kind: NotificationKind, details: &str) -> Result<()> {
        info!("[notification] {}: {}", kind.title(), details);
        Ok(())
    }
}

/// Fans a notification out to all configured sinks, swallowing errors
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    /// Default notifier: log only
    pub fn log_only() -> Self {
        Self::new(vec![Arc::new(LogNotifier)])
    }

    /// Send to every sink; a sink failure is logged, never returned
    pub async fn notify(&self, kind: NotificationKind, details: &str) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(kind, details).await {
                error!("Notification delivery failed ({}): {}", kind.title(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GridBotError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn send(&self, _kind: NotificationKind, _details: &str) -> Result<()> {
            Err(GridBotError::Exchange("sink down".into()))
        }
    }

    struct CountingSink {
        count: AtomicU32,
    }

    #[async_trait]
    impl NotificationSink for CountingSink {
        async fn send(&self, _kind: NotificationKind, _details: &str) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_failure_never_propagates() {
        let counting = Arc::new(CountingSink {
            count: AtomicU32::new(0),
        });
        let notifier = Notifier::new(vec![Arc::new(FailingSink), counting.clone()]);

        // Must not panic or return an error, and later sinks still run.
        notifier
            .notify(NotificationKind::OrderFailed, "details")
            .await;

        assert_eq!(counting.count.load(Ordering::SeqCst), 1);
    }
}
