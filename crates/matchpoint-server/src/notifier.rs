use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;

use matchpoint_core::game::UserId;
use matchpoint_core::notify::Notification;

/// Per-user sender for outbound notification frames.
/// Bounded so a slow consumer drops frames instead of blocking the
/// coordinator; `Bytes` so fan-out clones are zero-copy.
pub type UserSender = mpsc::Sender<Bytes>;

/// Outbound delivery boundary. The concrete transport (socket layer or
/// pub/sub broker) lives outside the core: it registers a channel per
/// connected user and drains the frames addressed to them.
pub trait Notifier: Send + Sync {
    fn send_to_user(&self, user_id: UserId, notification: &Notification);
}

/// In-process notifier backed by one bounded channel per user.
pub struct ChannelNotifier {
    senders: Mutex<HashMap<UserId, UserSender>>,
    buffer: usize,
}

impl ChannelNotifier {
    pub fn new(buffer: usize) -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            buffer,
        }
    }

    /// Register a user's outbound channel, returning the receiver half for
    /// the transport to drain. A re-register replaces the previous channel.
    pub fn register(&self, user_id: UserId) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.senders.lock().unwrap().insert(user_id, tx);
        rx
    }

    pub fn unregister(&self, user_id: UserId) {
        self.senders.lock().unwrap().remove(&user_id);
    }

    /// Wire frame: the notification wrapped with its logical topic.
    fn encode(notification: &Notification) -> Option<Bytes> {
        let frame = serde_json::json!({
            "topic": notification.topic(),
            "payload": notification,
        });
        match serde_json::to_vec(&frame) {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode notification");
                None
            },
        }
    }
}

impl Notifier for ChannelNotifier {
    fn send_to_user(&self, user_id: UserId, notification: &Notification) {
        let Some(data) = Self::encode(notification) else {
            return;
        };
        let senders = self.senders.lock().unwrap();
        if let Some(sender) = senders.get(&user_id)
            && let Err(e) = sender.try_send(data)
        {
            tracing::debug!(
                user = user_id, topic = %notification.topic(), error = %e,
                "Skipping notification to slow or disconnected user"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchpoint_core::game::GameType;

    fn timeout_notification() -> Notification {
        Notification::QueueTimeout {
            message: "Queue timeout - try alternative games".to_string(),
            alternatives: GameType::alternatives().to_vec(),
        }
    }

    #[tokio::test]
    async fn registered_user_receives_frames() {
        let notifier = ChannelNotifier::new(16);
        let mut rx = notifier.register(1);

        notifier.send_to_user(1, &timeout_notification());

        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["topic"], "matchmaking/queue-timeout");
        assert_eq!(value["payload"]["kind"], "QUEUE_TIMEOUT");
    }

    #[tokio::test]
    async fn unregistered_user_is_skipped() {
        let notifier = ChannelNotifier::new(16);
        let mut rx = notifier.register(1);

        // No channel for user 2; must not panic or cross-deliver.
        notifier.send_to_user(2, &timeout_notification());
        notifier.send_to_user(1, &timeout_notification());

        let frame = rx.recv().await.unwrap();
        assert!(!frame.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let notifier = ChannelNotifier::new(1);
        let mut rx = notifier.register(1);

        notifier.send_to_user(1, &timeout_notification());
        // Buffer is full now; this send is dropped, not blocked on.
        notifier.send_to_user(1, &timeout_notification());

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let notifier = ChannelNotifier::new(16);
        let mut rx = notifier.register(1);
        notifier.unregister(1);

        notifier.send_to_user(1, &timeout_notification());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn frames_preserve_send_order() {
        let notifier = ChannelNotifier::new(16);
        let mut rx = notifier.register(1);

        for i in 0..5u64 {
            let n = Notification::QueueTimeout {
                message: format!("m{i}"),
                alternatives: vec![],
            };
            notifier.send_to_user(1, &n);
        }

        for i in 0..5u64 {
            let frame = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
            assert_eq!(value["payload"]["message"], format!("m{i}"));
        }
    }
}
