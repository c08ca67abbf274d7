use std::sync::Arc;
use tokio::sync::watch;

/// Online/offline flag shared between the UI and the payment poller.
///
/// Cloning shares the same underlying channel; any clone may report a change.
#[derive(Clone, Debug)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.sender.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Waits until `receiver` reports online. Returns `false` if the sender is gone.
pub async fn wait_until_online(receiver: &mut watch::Receiver<bool>) -> bool {
    receiver.wait_for(|online| *online).await.is_ok()
}
