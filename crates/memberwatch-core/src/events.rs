use tokio::sync::broadcast;

/// In-process signal that the notification list changed.
///
/// Replaces the browser extension's broadcast DOM event with a typed
/// channel: anything rendering notifications subscribes and re-renders
/// on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// Records were added or changed; `count` is how many were touched
    Updated { count: usize },
    /// The list was emptied
    Cleared,
}

/// Broadcast bus for notification events. Cloning is cheap; all clones
/// share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        // Slow consumers lag rather than block the publisher
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Publish to whoever is listening. No subscribers is fine.
    pub fn publish(&self, event: NotificationEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
