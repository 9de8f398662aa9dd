//! Network selection.
//!
//! [`WifiNetworkSelector`] filters a scan round, decides whether selection
//! is warranted at all, and asks its registered [`NetworkEvaluator`]s for a
//! candidate in priority order. The first evaluator to nominate a network
//! wins; the user's explicit connect choices can then override it.

mod saved;

pub use saved::SavedNetworkEvaluator;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ScoringParams;
use crate::network::{NetworkId, SavedNetwork, WifiInfo};
use crate::pno::compare_by_status;
use crate::scan::{ScanResult, SecurityType, is_24ghz, is_5ghz};
use crate::store::ConfigStore;

/// Minimum time between two selections while connected.
pub const MINIMUM_NETWORK_SELECTION_INTERVAL: Duration = Duration::from_secs(10);

/// Evaluator priorities must be below this.
pub const MAX_NUM_EVALUATORS: u8 = 6;

/// Evaluator name recorded on candidates picked through a user choice.
pub const USER_CONNECT_CHOICE: &str = "UserConnectChoice";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkCandidate {
    pub network_id: NetworkId,
    pub ssid: String,
    pub bssid: String,
    pub security: SecurityType,
    pub score: i32,
    pub evaluator: &'static str,
}

/// A filtered scan entry and the saved profiles it matches, best status
/// first.
#[derive(Debug, Clone)]
pub struct ScanMatch {
    pub scan: ScanResult,
    pub network_ids: Vec<NetworkId>,
}

pub struct EvaluationContext<'a> {
    pub matches: &'a [ScanMatch],
    pub current_network_id: Option<NetworkId>,
    pub current_bssid: Option<&'a str>,
    pub connected: bool,
    pub disconnected: bool,
    pub untrusted_network_allowed: bool,
    /// Monotonic time of this selection round.
    pub now: Duration,
}

pub trait NetworkEvaluator: Send {
    fn name(&self) -> &'static str;

    /// Called with every round's matches before any evaluator runs.
    fn update(&mut self, _matches: &[ScanMatch], _store: &mut dyn ConfigStore) {}

    /// Pushes every network it considers connectable onto `connectable` and
    /// returns its pick, if any. Ties are the evaluator's to break.
    fn evaluate(
        &mut self,
        ctx: &EvaluationContext<'_>,
        store: &dyn ConfigStore,
        connectable: &mut Vec<NetworkCandidate>,
    ) -> Option<NetworkCandidate>;
}

pub struct SelectionRequest<'a> {
    pub scan_results: &'a [ScanResult],
    pub blacklist: &'a HashSet<String>,
    pub wifi_info: &'a WifiInfo,
    pub connected: bool,
    pub disconnected: bool,
    pub untrusted_network_allowed: bool,
}

pub struct WifiNetworkSelector {
    evaluators: Vec<(u8, Box<dyn NetworkEvaluator>)>,
    params: ScoringParams,
    clock: Arc<dyn Clock>,
    last_selection: Option<Duration>,
}

impl WifiNetworkSelector {
    pub fn new(params: ScoringParams, clock: Arc<dyn Clock>) -> Self {
        Self {
            evaluators: Vec::new(),
            params,
            clock,
            last_selection: None,
        }
    }

    /// Registers an evaluator; lower priorities run first. Returns false for
    /// an out of range priority.
    pub fn register_evaluator(&mut self, evaluator: Box<dyn NetworkEvaluator>, priority: u8) -> bool {
        if priority >= MAX_NUM_EVALUATORS {
            return false;
        }
        let position = self
            .evaluators
            .iter()
            .position(|(p, _)| *p > priority)
            .unwrap_or(self.evaluators.len());
        self.evaluators.insert(position, (priority, evaluator));
        true
    }

    pub fn last_selection(&self) -> Option<Duration> {
        self.last_selection
    }

    pub fn select_network(
        &mut self,
        request: &SelectionRequest<'_>,
        store: &mut dyn ConfigStore,
    ) -> Option<NetworkCandidate> {
        if request.scan_results.is_empty() {
            debug!("empty scan results, skipping network selection");
            return None;
        }

        let current_bssid = request.wifi_info.bssid.as_deref();
        let mut current_bssid_seen = false;
        let mut filtered = Vec::new();
        for scan in request.scan_results {
            if Some(scan.bssid.as_str()) == current_bssid {
                current_bssid_seen = true;
            }
            if scan.ssid.is_empty() || scan.bssid.is_empty() {
                continue;
            }
            if request.blacklist.contains(&scan.bssid) {
                debug!(bssid = %scan.bssid, "skipping blacklisted bssid");
                continue;
            }
            if scan.level < self.params.bad_rssi(scan.is_5ghz()) {
                continue;
            }
            filtered.push(scan.clone());
        }

        if filtered.is_empty() {
            debug!("no scan result above the minimum signal level");
            return None;
        }

        if !self.is_selection_needed(request, store) {
            return None;
        }

        if request.connected && !current_bssid_seen {
            info!("current network is missing from the scan results, skipping selection");
            return None;
        }

        store.clear_candidates();
        let matches = match_saved_networks(&filtered, store);

        for (_, evaluator) in self.evaluators.iter_mut() {
            evaluator.update(&matches, store);
        }

        let ctx = EvaluationContext {
            matches: &matches,
            current_network_id: request.wifi_info.network_id,
            current_bssid,
            connected: request.connected,
            disconnected: request.disconnected,
            untrusted_network_allowed: request.untrusted_network_allowed,
            now: self.clock.elapsed(),
        };

        let mut connectable = Vec::new();
        let mut selected = None;
        for (_, evaluator) in self.evaluators.iter_mut() {
            if let Some(candidate) = evaluator.evaluate(&ctx, &*store, &mut connectable) {
                debug!(evaluator = evaluator.name(), network_id = candidate.network_id, "evaluator nominated a network");
                selected = Some(candidate);
                break;
            }
        }

        for candidate in &connectable {
            store.set_seen_in_last_selection(candidate.network_id, true);
            if let Some(scan) = filtered.iter().find(|s| s.bssid == candidate.bssid) {
                store.set_candidate(candidate.network_id, scan.clone(), candidate.score);
            }
        }

        let selected = override_with_user_choice(selected?, &matches, &*store);
        self.last_selection = Some(self.clock.elapsed());
        info!(
            network_id = selected.network_id,
            ssid = %selected.ssid,
            bssid = %selected.bssid,
            score = selected.score,
            evaluator = selected.evaluator,
            "network selected"
        );
        Some(selected)
    }

    /// Records that the user picked `network_id` over every network seen in
    /// the last qualified selection. Returns false for an unknown id.
    pub fn set_user_connect_choice(&self, network_id: NetworkId, store: &mut dyn ConfigStore) -> bool {
        let Some(chosen) = store.get(network_id) else {
            return false;
        };
        let key = chosen.config_key();
        let now = self.clock.wall_clock_millis();

        for network in store.saved_networks() {
            let Some(id) = network.network_id else {
                continue;
            };
            if id == network_id || !network.selection.seen_in_last_qualified_selection {
                continue;
            }
            if network.selection.connect_choice.as_deref() != Some(key.as_str()) {
                debug!(network_id = id, choice = %key, "setting connect choice");
                store.set_connect_choice(id, Some(key.clone()), Some(now));
            }
        }

        store.enable_network(network_id);
        store.set_connect_choice(network_id, None, None);
        true
    }

    fn is_selection_needed(&self, request: &SelectionRequest<'_>, store: &dyn ConfigStore) -> bool {
        if request.connected {
            if let Some(last) = self.last_selection {
                let since = self.clock.elapsed().saturating_sub(last);
                if since < MINIMUM_NETWORK_SELECTION_INTERVAL {
                    debug!(since_ms = since.as_millis() as u64, "too soon since the last selection");
                    return false;
                }
            }
            if self.is_current_network_sufficient(request.wifi_info, store) {
                debug!("current network is sufficient");
                return false;
            }
            true
        } else if request.disconnected {
            true
        } else {
            debug!("connection in progress, skipping selection");
            false
        }
    }

    fn is_current_network_sufficient(&self, info: &WifiInfo, store: &dyn ConfigStore) -> bool {
        let Some(network) = info.network_id.and_then(|id| store.get(id)) else {
            return false;
        };
        if is_24ghz(info.frequency) {
            debug!("current network is on 2.4GHz");
            return false;
        }
        if network.security.is_open() {
            debug!("current network is open");
            return false;
        }
        let qualified = self.params.low_rssi(is_5ghz(info.frequency));
        if info.rssi < qualified {
            debug!(rssi = info.rssi, qualified, "current network signal is below the qualified level");
            return false;
        }
        true
    }
}

fn match_saved_networks(filtered: &[ScanResult], store: &dyn ConfigStore) -> Vec<ScanMatch> {
    let saved = store.saved_networks();
    filtered
        .iter()
        .map(|scan| {
            let mut matching: Vec<&SavedNetwork> = saved.iter().filter(|n| n.matches(scan)).collect();
            matching.sort_by(|a, b| compare_by_status(a, b, |a, b| a.network_id.cmp(&b.network_id)));
            ScanMatch {
                scan: scan.clone(),
                network_ids: matching.iter().filter_map(|n| n.network_id).collect(),
            }
        })
        .collect()
}

/// Strongest scan entry in this round for a profile.
fn best_scan_for(matches: &[ScanMatch], network_id: NetworkId) -> Option<&ScanResult> {
    matches
        .iter()
        .filter(|m| m.network_ids.contains(&network_id))
        .map(|m| &m.scan)
        .max_by_key(|s| s.level)
}

/// Follows the connect choice chain from the nominated profile. A chained
/// profile replaces the nomination when it is enabled and was seen in this
/// round's scan.
fn override_with_user_choice(
    candidate: NetworkCandidate,
    matches: &[ScanMatch],
    store: &dyn ConfigStore,
) -> NetworkCandidate {
    let mut visited = HashSet::from([candidate.network_id]);
    let mut next_key = store
        .get(candidate.network_id)
        .and_then(|n| n.selection.connect_choice.clone());
    let mut chosen = candidate;

    while let Some(key) = next_key {
        let Some(network) = store.get_by_config_key(&key) else {
            break;
        };
        let Some(id) = network.network_id else {
            break;
        };
        if !visited.insert(id) {
            break;
        }
        if network.selection.is_enabled() {
            if let Some(scan) = best_scan_for(matches, id) {
                chosen = NetworkCandidate {
                    network_id: id,
                    ssid: network.ssid.clone(),
                    bssid: scan.bssid.clone(),
                    security: network.security,
                    score: network.selection.candidate_score.unwrap_or(0),
                    evaluator: USER_CONNECT_CHOICE,
                };
            }
        }
        next_key = network.selection.connect_choice.clone();
    }

    if chosen.evaluator == USER_CONNECT_CHOICE {
        info!(network_id = chosen.network_id, "user connect choice overrides the evaluators");
    }
    chosen
}

#[cfg(test)]
mod tests;
