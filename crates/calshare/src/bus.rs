use tokio::sync::broadcast;

use crate::event::CacheEvent;

#[derive(Clone)]
pub struct Bus {
    sender: broadcast::Sender<CacheEvent>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of receivers; zero receivers is not an error here.
    pub fn publish(&self, event: CacheEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
