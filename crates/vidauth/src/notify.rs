//! Login state notifications.
//!
//! Events are published on a bounded broadcast channel. Publishing never
//! waits for a consumer: with no subscriber the event is dropped, and a
//! subscriber that falls behind loses the oldest events first.

use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 16;

/// Publishes `true` on login and `false` on logout or invalidation.
#[derive(Debug, Clone)]
pub struct AuthNotifier {
    tx: broadcast::Sender<bool>,
}

impl Default for AuthNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AuthNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn logged_in(&self) {
        self.publish(true);
    }

    pub fn logged_out(&self) {
        self.publish(false);
    }

    fn publish(&self, authenticated: bool) {
        match self.tx.send(authenticated) {
            Ok(receivers) => {
                tracing::debug!(authenticated, receivers, "Sent login update");
            }
            Err(_) => {
                tracing::debug!(authenticated, "No subscriber for login update");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_publish_without_subscriber_does_not_block() {
        let notifier = AuthNotifier::new(1);
        for _ in 0..100 {
            notifier.logged_in();
            notifier.logged_out();
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let notifier = AuthNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.logged_in();
        notifier.logged_out();

        assert_eq!(rx.recv().await.unwrap(), true);
        assert_eq!(rx.recv().await.unwrap(), false);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest() {
        let notifier = AuthNotifier::new(2);
        let mut rx = notifier.subscribe();

        notifier.logged_in();
        notifier.logged_out();
        notifier.logged_in();

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(rx.try_recv().unwrap(), false);
        assert_eq!(rx.try_recv().unwrap(), true);
    }
}
