//! Saved network storage as seen by the state machine and the selector.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::network::{DisableReason, NetworkId, SavedNetwork, SelectionStatus};
use crate::scan::ScanResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkUpdateResult {
    pub network_id: NetworkId,
    pub is_new: bool,
}

/// Typed access to saved network profiles.
///
/// Lookups take ids; a profile is also addressable by its config key (see
/// [`SavedNetwork::config_key`]). Operations on an unknown id return `false`
/// or `None` instead of failing.
pub trait ConfigStore: Send {
    /// Adds a profile, or updates the one with the same id or config key.
    /// Returns `None` for a profile without an SSID.
    fn add_or_update(&mut self, network: SavedNetwork) -> Option<NetworkUpdateResult>;
    fn remove(&mut self, network_id: NetworkId) -> bool;
    fn get(&self, network_id: NetworkId) -> Option<&SavedNetwork>;
    fn get_by_config_key(&self, key: &str) -> Option<&SavedNetwork>;
    fn saved_networks(&self) -> Vec<SavedNetwork>;

    fn enable_network(&mut self, network_id: NetworkId) -> bool;
    fn disable_network(&mut self, network_id: NetworkId, reason: DisableReason) -> bool;

    fn set_connect_choice(
        &mut self,
        network_id: NetworkId,
        choice: Option<String>,
        timestamp: Option<u64>,
    ) -> bool;
    fn set_seen_in_last_selection(&mut self, network_id: NetworkId, seen: bool) -> bool;
    fn set_candidate(&mut self, network_id: NetworkId, scan: ScanResult, score: i32) -> bool;
    /// Clears candidate data and the seen flag on every profile.
    fn clear_candidates(&mut self);

    /// Records the profile the user picked last, with the pick time in
    /// monotonic milliseconds.
    fn set_last_selected(&mut self, network_id: NetworkId, at_millis: u64);
    fn last_selected(&self) -> Option<(NetworkId, u64)>;

    /// Marks a profile as having completed a connection.
    fn mark_connected(&mut self, network_id: NetworkId) -> bool;

    fn hidden_network_ssids(&self) -> Vec<String> {
        self.saved_networks()
            .into_iter()
            .filter(|n| n.hidden)
            .map(|n| n.ssid)
            .collect()
    }
}

/// In-memory [`ConfigStore`].
#[derive(Debug, Default)]
pub struct SavedNetworkStore {
    networks: BTreeMap<NetworkId, SavedNetwork>,
    next_id: NetworkId,
    last_selected: Option<(NetworkId, u64)>,
}

impl SavedNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    fn with_network<F>(&mut self, network_id: NetworkId, f: F) -> bool
    where
        F: FnOnce(&mut SavedNetwork),
    {
        match self.networks.get_mut(&network_id) {
            Some(network) => {
                f(network);
                true
            }
            None => false,
        }
    }
}

impl ConfigStore for SavedNetworkStore {
    fn add_or_update(&mut self, mut network: SavedNetwork) -> Option<NetworkUpdateResult> {
        if network.ssid.is_empty() {
            return None;
        }

        let existing = network
            .network_id
            .filter(|id| self.networks.contains_key(id))
            .or_else(|| {
                let key = network.config_key();
                self.networks
                    .values()
                    .find(|n| n.config_key() == key)
                    .and_then(|n| n.network_id)
            });

        match existing {
            Some(id) => {
                let current = self.networks.get_mut(&id)?;
                current.ssid = network.ssid;
                current.security = network.security;
                current.hidden = network.hidden;
                current.trusted = network.trusted;
                if network.psk.is_some() {
                    current.psk = network.psk;
                }
                debug!(network_id = id, "updated saved network");
                Some(NetworkUpdateResult {
                    network_id: id,
                    is_new: false,
                })
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                network.network_id = Some(id);
                self.networks.insert(id, network);
                debug!(network_id = id, "added saved network");
                Some(NetworkUpdateResult {
                    network_id: id,
                    is_new: true,
                })
            }
        }
    }

    fn remove(&mut self, network_id: NetworkId) -> bool {
        let Some(removed) = self.networks.remove(&network_id) else {
            return false;
        };
        let key = removed.config_key();
        for network in self.networks.values_mut() {
            if network.selection.connect_choice.as_deref() == Some(key.as_str()) {
                network.selection.connect_choice = None;
                network.selection.connect_choice_timestamp = None;
            }
        }
        if self.last_selected.map(|(id, _)| id) == Some(network_id) {
            self.last_selected = None;
        }
        true
    }

    fn get(&self, network_id: NetworkId) -> Option<&SavedNetwork> {
        self.networks.get(&network_id)
    }

    fn get_by_config_key(&self, key: &str) -> Option<&SavedNetwork> {
        self.networks.values().find(|n| n.config_key() == key)
    }

    fn saved_networks(&self) -> Vec<SavedNetwork> {
        self.networks.values().cloned().collect()
    }

    fn enable_network(&mut self, network_id: NetworkId) -> bool {
        self.with_network(network_id, |n| {
            n.selection.status = SelectionStatus::Enabled;
            n.selection.disable_reason = None;
        })
    }

    fn disable_network(&mut self, network_id: NetworkId, reason: DisableReason) -> bool {
        self.with_network(network_id, |n| {
            n.selection.status = reason.status();
            n.selection.disable_reason = Some(reason);
        })
    }

    fn set_connect_choice(
        &mut self,
        network_id: NetworkId,
        choice: Option<String>,
        timestamp: Option<u64>,
    ) -> bool {
        self.with_network(network_id, |n| {
            n.selection.connect_choice = choice;
            n.selection.connect_choice_timestamp = timestamp;
        })
    }

    fn set_seen_in_last_selection(&mut self, network_id: NetworkId, seen: bool) -> bool {
        self.with_network(network_id, |n| {
            n.selection.seen_in_last_qualified_selection = seen;
        })
    }

    fn set_candidate(&mut self, network_id: NetworkId, scan: ScanResult, score: i32) -> bool {
        self.with_network(network_id, |n| {
            n.selection.candidate = Some(scan);
            n.selection.candidate_score = Some(score);
        })
    }

    fn clear_candidates(&mut self) {
        for network in self.networks.values_mut() {
            network.selection.candidate = None;
            network.selection.candidate_score = None;
            network.selection.seen_in_last_qualified_selection = false;
        }
    }

    fn set_last_selected(&mut self, network_id: NetworkId, at_millis: u64) {
        if self.networks.contains_key(&network_id) {
            self.last_selected = Some((network_id, at_millis));
        }
    }

    fn last_selected(&self) -> Option<(NetworkId, u64)> {
        self.last_selected
    }

    fn mark_connected(&mut self, network_id: NetworkId) -> bool {
        self.with_network(network_id, |n| {
            n.has_ever_connected = true;
            n.selection.status = SelectionStatus::Enabled;
            n.selection.disable_reason = None;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::SecurityType;

    fn psk(ssid: &str) -> SavedNetwork {
        SavedNetwork::new(ssid, SecurityType::Psk).with_psk("password")
    }

    #[test]
    fn add_assigns_fresh_ids() {
        let mut store = SavedNetworkStore::new();
        let a = store.add_or_update(psk("a")).unwrap();
        let b = store.add_or_update(psk("b")).unwrap();
        assert!(a.is_new && b.is_new);
        assert_ne!(a.network_id, b.network_id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn same_config_key_updates_in_place() {
        let mut store = SavedNetworkStore::new();
        let first = store.add_or_update(psk("a")).unwrap();
        store.disable_network(first.network_id, DisableReason::DhcpFailure);

        let second = store
            .add_or_update(SavedNetwork::new("a", SecurityType::Psk).with_psk("other"))
            .unwrap();
        assert_eq!(second.network_id, first.network_id);
        assert!(!second.is_new);

        let stored = store.get(first.network_id).unwrap();
        assert_eq!(stored.psk.as_deref(), Some("other"));
        assert_eq!(stored.selection.status, SelectionStatus::TemporarilyDisabled);
    }

    #[test]
    fn empty_ssid_is_rejected() {
        let mut store = SavedNetworkStore::new();
        assert!(store.add_or_update(psk("")).is_none());
    }

    #[test]
    fn unknown_ids_report_false() {
        let mut store = SavedNetworkStore::new();
        assert!(!store.remove(7));
        assert!(!store.enable_network(7));
        assert!(!store.disable_network(7, DisableReason::ByUser));
        assert!(!store.mark_connected(7));
        assert!(store.get(7).is_none());
    }

    #[test]
    fn removing_a_network_clears_choices_pointing_at_it() {
        let mut store = SavedNetworkStore::new();
        let a = store.add_or_update(psk("a")).unwrap().network_id;
        let b = store.add_or_update(psk("b")).unwrap().network_id;
        store.set_connect_choice(a, Some(psk("b").config_key()), Some(1));
        store.set_last_selected(b, 10);

        assert!(store.remove(b));
        assert_eq!(store.get(a).unwrap().selection.connect_choice, None);
        assert_eq!(store.last_selected(), None);
    }

    #[test]
    fn clear_candidates_resets_seen_flags() {
        let mut store = SavedNetworkStore::new();
        let a = store.add_or_update(psk("a")).unwrap().network_id;
        let scan = ScanResult::new("a", "aa:bb:cc:dd:ee:ff", 2412, "[WPA2-PSK-CCMP]", -60);
        store.set_candidate(a, scan, 100);
        store.set_seen_in_last_selection(a, true);

        store.clear_candidates();
        let network = store.get(a).unwrap();
        assert!(network.selection.candidate.is_none());
        assert!(!network.selection.seen_in_last_qualified_selection);
    }

    #[test]
    fn hidden_ssids_come_from_hidden_profiles() {
        let mut store = SavedNetworkStore::new();
        store.add_or_update(psk("visible"));
        store.add_or_update(psk("secret").with_hidden(true));
        assert_eq!(store.hidden_network_ssids(), vec!["secret".to_string()]);
    }
}
