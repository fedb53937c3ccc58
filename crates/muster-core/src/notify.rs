//! Notification sink seam

use muster_api::Notification;
use muster_store::Store;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Receives fire-and-forget notifications.
///
/// Callers log and swallow failures; a failed delivery never undoes the
/// state change that triggered it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Sink that files notifications into the store's inbox table
pub struct StoreNotificationSink {
    store: Arc<dyn Store>,
}

impl StoreNotificationSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl NotificationSink for StoreNotificationSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.store
            .append_notification(notification)
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        debug!(
            user_id = %notification.user_id,
            related_id = %notification.related_id,
            "Notification stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_api::NotificationKind;
    use muster_store::SqliteStore;

    #[test]
    fn test_store_sink_files_notification() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let sink = StoreNotificationSink::new(store.clone());

        let notification = Notification {
            user_id: "s1".into(),
            title: "Chess Club".into(),
            message: "Your signup for Chess Club has been confirmed".into(),
            kind: NotificationKind::SignupConfirmed,
            related_id: "abc".into(),
        };
        sink.notify(&notification).unwrap();

        assert_eq!(store.list_notifications("s1").unwrap(), vec![notification]);
    }
}
