//! Raw change notification channel.
//!
//! The sending half is handed to whatever observes changes (a watcher
//! process, a stdin reader, a test); the receiving half is consumed by the
//! session's event loop.

use std::path::Path;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::coalescer::ChangeNotification;
use super::keys::DependencyKey;

/// Receiving half of the change channel.
pub type ChangeReceiver = mpsc::UnboundedReceiver<ChangeNotification>;

#[derive(Debug, Error)]
#[error("build session is no longer accepting change notifications")]
pub struct SessionClosed;

/// Sending half of the change channel.
///
/// Cloneable; the session stops once every notifier has been dropped.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: mpsc::UnboundedSender<ChangeNotification>,
}

/// Create a connected notifier/receiver pair.
pub fn change_channel() -> (ChangeNotifier, ChangeReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChangeNotifier { sender }, receiver)
}

impl ChangeNotifier {
    /// Report that the resource named by `key` changed.
    pub fn notify(&self, key: impl Into<DependencyKey>) -> Result<(), SessionClosed> {
        let notification = ChangeNotification::new(key);
        debug!(key = %notification.key, "Change notification enqueued");
        self.sender.send(notification).map_err(|_| SessionClosed)
    }

    /// Report that the file at `path` changed.
    pub fn file_changed(&self, path: impl AsRef<Path>) -> Result<(), SessionClosed> {
        self.notify(DependencyKey::from_path(path))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifications_arrive_in_order() {
        let (notifier, mut receiver) = change_channel();

        notifier.notify("a").expect("open channel");
        notifier.file_changed("content/./b.md").expect("open channel");

        assert_eq!(
            receiver.recv().await.map(|n| n.key),
            Some(DependencyKey::new("a"))
        );
        assert_eq!(
            receiver.recv().await.map(|n| n.key),
            Some(DependencyKey::new("content/b.md"))
        );
    }

    #[tokio::test]
    async fn notify_after_receiver_dropped_fails() {
        let (notifier, receiver) = change_channel();
        drop(receiver);

        assert!(notifier.is_closed());
        assert!(notifier.notify("a").is_err());
    }
}
