//! Post-registration notifications.
//!
//! Registration hands a [`RegistrationNotice`] to a [`RegistrationNotifier`]
//! and moves on. The channel implementation queues notices on a bounded
//! channel with `try_send`; a full queue drops the notice (logged), so
//! delivery is at-most-once and never slows registration down. A background
//! worker drains the queue into a [`NotificationSink`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use corner_shop_core::{Email, UserId};

/// A newly registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationNotice {
    pub user_id: UserId,
    pub email: Email,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Accepts notices without blocking the caller.
pub trait RegistrationNotifier: Send + Sync {
    /// Queue a notice. Returns `false` if it was dropped.
    fn notify(&self, notice: RegistrationNotice) -> bool;
}

/// Final destination of queued notices.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notice: &RegistrationNotice) -> Result<(), NotifyError>;
}

/// Sink that only records the notice in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notice: &RegistrationNotice) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %notice.user_id,
            domain = notice.email.domain(),
            "Registration notice delivered"
        );
        Ok(())
    }
}

/// Bounded queue in front of a [`NotificationSink`].
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<RegistrationNotice>,
}

impl ChannelNotifier {
    /// Create the queue and spawn its worker. The worker exits once every
    /// notifier clone has been dropped and the queue is drained.
    #[must_use]
    pub fn spawn(capacity: usize, sink: Arc<dyn NotificationSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<RegistrationNotice>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                if let Err(e) = sink.deliver(&notice).await {
                    tracing::warn!(user_id = %notice.user_id, error = %e, "Notification dropped");
                }
            }
            tracing::debug!("Notification worker stopped");
        });
        (Self { tx }, worker)
    }
}

impl RegistrationNotifier for ChannelNotifier {
    fn notify(&self, notice: RegistrationNotice) -> bool {
        match self.tx.try_send(notice) {
            Ok(()) => true,
            Err(TrySendError::Full(notice)) => {
                tracing::warn!(user_id = %notice.user_id, "Notification queue full, dropping");
                false
            }
            Err(TrySendError::Closed(notice)) => {
                tracing::warn!(user_id = %notice.user_id, "Notification worker gone, dropping");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<UserId>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, notice: &RegistrationNotice) -> Result<(), NotifyError> {
            self.seen.lock().push(notice.user_id);
            Ok(())
        }
    }

    /// Never finishes a delivery.
    struct StuckSink;

    #[async_trait]
    impl NotificationSink for StuckSink {
        async fn deliver(&self, _notice: &RegistrationNotice) -> Result<(), NotifyError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn notice(id: i64) -> RegistrationNotice {
        RegistrationNotice {
            user_id: UserId::new(id),
            email: Email::parse("new@example.com").unwrap(),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let (notifier, worker) = ChannelNotifier::spawn(8, sink.clone());
        assert!(notifier.notify(notice(1)));
        assert!(notifier.notify(notice(2)));
        drop(notifier);

        worker.await.unwrap();
        assert_eq!(*sink.seen.lock(), vec![UserId::new(1), UserId::new(2)]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (notifier, _worker) = ChannelNotifier::spawn(1, Arc::new(StuckSink));
        // The worker takes at most one notice off the queue and then parks in
        // the sink, so a handful of sends must overflow a queue of one.
        let accepted = (0..5).filter(|&i| notifier.notify(notice(i))).count();
        assert!(accepted < 5);
    }

    #[tokio::test]
    async fn test_closed_worker_drops() {
        let (notifier, worker) = ChannelNotifier::spawn(4, Arc::new(LogSink));
        worker.abort();
        let _ = worker.await;
        assert!(!notifier.notify(notice(1)));
    }
}
