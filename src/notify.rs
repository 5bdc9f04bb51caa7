/*!
 * Notify Module
 * Process-wide announcement broadcast channel. Set once before the server
 * starts accepting traffic, read-only thereafter.
 */
use tokio::sync::broadcast;
use tokio::sync::OnceCell;

use crate::db::models::Announcement;

static CHANNEL: OnceCell<broadcast::Sender<Announcement>> = OnceCell::const_new();

const CHANNEL_CAPACITY: usize = 64;

/// Initialize the broadcast channel. Must be called before serving traffic;
/// a second call is a no-op.
pub fn init() {
    let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
    let _ = CHANNEL.set(tx);
}

/// Publish an announcement to all connected subscribers. Fire-and-forget:
/// a send with no subscribers (or before init) is not an error.
pub fn publish(announcement: &Announcement) {
    if let Some(tx) = CHANNEL.get() {
        let delivered = tx.send(announcement.clone()).unwrap_or(0);
        tracing::debug!(
            announcement_id = %announcement.id,
            subscribers = delivered,
            "announcement broadcast"
        );
    }
}

/// Subscribe to the announcement stream. `None` before `init` has run.
pub fn subscribe() -> Option<broadcast::Receiver<Announcement>> {
    CHANNEL.get().map(|tx| tx.subscribe())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_announcement() -> Announcement {
        Announcement {
            id: Uuid::new_v4(),
            title: "Maintenance window".to_string(),
            content: "The platform will be briefly unavailable.".to_string(),
            audience: "all".to_string(),
            status: "active".to_string(),
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        init();
        let mut rx = subscribe().expect("channel initialized");
        let ann = sample_announcement();
        publish(&ann);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, ann.id);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        init();
        publish(&sample_announcement());
    }
}
