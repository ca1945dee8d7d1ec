//! Completion notifications for fire-and-forget recognition

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use super::model::CompletionNotification;

/// Fans completion notifications out to every current subscriber
///
/// Notifications are not queued: a subscriber only sees notifications
/// published after it subscribed.
#[derive(Default)]
pub struct CompletionEvents {
    subscribers: Mutex<Vec<Sender<CompletionNotification>>>,
}

impl CompletionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<CompletionNotification> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `notification` to all live subscribers, returning how many
    /// received it
    pub fn publish(&self, notification: CompletionNotification) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());

        if subscribers.is_empty() {
            debug!(
                "No subscribers for completion of request {}",
                notification.request_id
            );
        }
        subscribers.len()
    }

    /// Number of live subscribers as of the last publish
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
