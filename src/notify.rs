//! Notifications emitted by the state machine.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::network::{NetworkId, RadioMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WifiState {
    Disabling,
    #[default]
    Disabled,
    Enabling,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApState {
    Disabling,
    #[default]
    Disabled,
    Enabling,
    Enabled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApFailure {
    General,
    NoChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Disconnected,
    Connecting,
    ObtainingIp,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    WifiStateChanged {
        state: WifiState,
        previous: WifiState,
    },
    ApStateChanged {
        state: ApState,
        previous: ApState,
        /// Only set when `state` is `Failed`.
        failure: Option<ApFailure>,
        interface: Option<String>,
        mode: RadioMode,
    },
    NetworkStateChanged {
        state: NetworkState,
        network_id: Option<NetworkId>,
        bssid: Option<String>,
    },
    ScanResultsAvailable {
        count: usize,
    },
    ScanFailed,
    WpsCompleted,
    WpsFailed,
}

pub trait Notifier: Send {
    fn notify(&self, notification: Notification);
}

/// Fans notifications out to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        trace!(?notification, "notify");
        // no subscribers is fine
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_notifications() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.notify(Notification::ScanResultsAvailable { count: 3 });
        assert_eq!(rx.try_recv().unwrap(), Notification::ScanResultsAvailable { count: 3 });
    }

    #[test]
    fn notifying_without_subscribers_is_fine() {
        BroadcastNotifier::new(1).notify(Notification::WpsCompleted);
    }

    #[test]
    fn notifications_serialize_with_event_tag() {
        let json = serde_json::to_value(Notification::WifiStateChanged {
            state: WifiState::Enabled,
            previous: WifiState::Enabling,
        })
        .unwrap();
        assert_eq!(json["event"], "wifi_state_changed");
        assert_eq!(json["state"], "enabled");
    }
}
