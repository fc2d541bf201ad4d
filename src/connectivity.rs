//! Online/offline signal.
//!
//! [`Connectivity`] is a cheap cloneable handle around a `watch` channel. The
//! probe task feeds it; sessions read it to decide whether a mutation should
//! also sync; the reconnect task reacts to offline→online edges.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::ApiClient;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Publish a new state. Returns true if it differs from the previous one.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Poll the API host and publish reachability until the task is aborted.
pub fn spawn_probe(connectivity: Connectivity, client: ApiClient, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = client.probe().await;
            connectivity.set_online(online);
        }
    })
}

/// Push the user document once every time the signal goes offline→online.
/// Runs until aborted.
pub fn spawn_reconnect_sync(session: Session) -> JoinHandle<()> {
    let mut rx = session.connectivity().subscribe();
    // Taken before spawning so an edge published right after this call counts.
    let mut was_online = *rx.borrow_and_update();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            if online && !was_online {
                let outcome = session.push_user().await;
                tracing::info!("Reconnect push: {}", outcome);
            }
            was_online = online;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_online_reports_only_real_changes() {
        let connectivity = Connectivity::offline();
        assert!(!connectivity.is_online());

        assert!(connectivity.set_online(true));
        assert!(!connectivity.set_online(true));
        assert!(connectivity.is_online());

        assert!(connectivity.set_online(false));
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let connectivity = Connectivity::offline();
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        // Re-publishing the same state does not wake anyone.
        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let a = Connectivity::offline();
        let b = a.clone();
        b.set_online(true);
        assert!(a.is_online());
    }
}
