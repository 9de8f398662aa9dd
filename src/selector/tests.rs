use super::*;
use crate::clock::ManualClock;
use crate::network::DisableReason;
use crate::store::SavedNetworkStore;

const MIN_RSSI_24G: i32 = -85;
const MIN_RSSI_5G: i32 = -82;

/// Nominates a fixed network when it is in the round, and reports every
/// matched network as connectable.
struct FixedEvaluator {
    pick: NetworkId,
}

impl NetworkEvaluator for FixedEvaluator {
    fn name(&self) -> &'static str {
        "FixedEvaluator"
    }

    fn evaluate(
        &mut self,
        ctx: &EvaluationContext<'_>,
        store: &dyn ConfigStore,
        connectable: &mut Vec<NetworkCandidate>,
    ) -> Option<NetworkCandidate> {
        let mut pick = None;
        for m in ctx.matches {
            for &id in &m.network_ids {
                let network = store.get(id)?;
                let candidate = NetworkCandidate {
                    network_id: id,
                    ssid: network.ssid.clone(),
                    bssid: m.scan.bssid.clone(),
                    security: network.security,
                    score: m.scan.level,
                    evaluator: "FixedEvaluator",
                };
                if id == self.pick {
                    pick = Some(candidate.clone());
                }
                connectable.push(candidate);
            }
        }
        pick
    }
}

struct Harness {
    selector: WifiNetworkSelector,
    store: SavedNetworkStore,
    clock: ManualClock,
    blacklist: HashSet<String>,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::new();
        let mut selector = WifiNetworkSelector::new(ScoringParams::default(), Arc::new(clock.clone()));
        selector.register_evaluator(
            Box::new(SavedNetworkEvaluator::new(ScoringParams::default())),
            1,
        );
        Self {
            selector,
            store: SavedNetworkStore::new(),
            clock,
            blacklist: HashSet::new(),
        }
    }

    fn with_evaluator(evaluator: Box<dyn NetworkEvaluator>) -> Self {
        let clock = ManualClock::new();
        let mut selector = WifiNetworkSelector::new(ScoringParams::default(), Arc::new(clock.clone()));
        selector.register_evaluator(evaluator, 0);
        Self {
            selector,
            store: SavedNetworkStore::new(),
            clock,
            blacklist: HashSet::new(),
        }
    }

    fn add(&mut self, ssid: &str, security: SecurityType) -> NetworkId {
        self.store
            .add_or_update(SavedNetwork::new(ssid, security))
            .unwrap()
            .network_id
    }

    fn select(&mut self, scans: &[ScanResult], info: &WifiInfo, connected: bool) -> Option<NetworkCandidate> {
        let request = SelectionRequest {
            scan_results: scans,
            blacklist: &self.blacklist,
            wifi_info: info,
            connected,
            disconnected: !connected,
            untrusted_network_allowed: false,
        };
        self.selector.select_network(&request, &mut self.store)
    }

    fn select_disconnected(&mut self, scans: &[ScanResult]) -> Option<NetworkCandidate> {
        self.select(scans, &WifiInfo::default(), false)
    }

    fn past_cooldown(&self) {
        self.clock
            .advance(MINIMUM_NETWORK_SELECTION_INTERVAL + Duration::from_secs(2));
    }
}

fn psk_scan(ssid: &str, bssid: &str, frequency: u32, level: i32) -> ScanResult {
    ScanResult::new(ssid, bssid, frequency, "[WPA2-PSK-CCMP][ESS]", level)
}

fn connected_info(id: NetworkId, scan: &ScanResult, rssi: i32) -> WifiInfo {
    WifiInfo {
        network_id: Some(id),
        ssid: Some(scan.ssid.clone()),
        bssid: Some(scan.bssid.clone()),
        frequency: scan.frequency,
        rssi,
        ..WifiInfo::default()
    }
}

#[test]
fn empty_scan_results_select_nothing() {
    let mut h = Harness::new();
    h.add("test1", SecurityType::Psk);
    assert!(h.select_disconnected(&[]).is_none());
    assert!(h.selector.last_selection().is_none());
}

#[test]
fn results_below_band_minimum_select_nothing() {
    let mut h = Harness::new();
    h.add("test1", SecurityType::Psk);
    h.add("test2", SecurityType::Psk);
    let scans = [
        psk_scan("test1", "6c:f3:7f:ae:8c:f3", 2437, MIN_RSSI_24G - 1),
        psk_scan("test2", "6c:f3:7f:ae:8c:f4", 5180, MIN_RSSI_5G - 1),
    ];
    assert!(h.select_disconnected(&scans).is_none());
}

#[test]
fn end_to_end_select_then_hold_during_cooldown() {
    let mut h = Harness::new();
    let id = h.add("test1", SecurityType::Psk);
    let scans = [psk_scan("test1", "6c:f3:7f:ae:8c:f3", 5180, MIN_RSSI_5G + 1)];

    let candidate = h.select_disconnected(&scans).unwrap();
    assert_eq!(candidate.network_id, id);
    assert_eq!(candidate.bssid, "6c:f3:7f:ae:8c:f3");

    let info = connected_info(id, &scans[0], MIN_RSSI_5G + 1);
    assert!(h.select(&scans, &info, true).is_none());
}

#[test]
fn no_thrash_inside_cooldown_even_with_better_signal() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    h.add("b", SecurityType::Psk);
    let first = [psk_scan("a", "00:00:00:00:00:0a", 5180, -60)];
    assert_eq!(h.select_disconnected(&first).unwrap().network_id, a);

    let improved = [
        psk_scan("a", "00:00:00:00:00:0a", 5180, -60),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -40),
    ];
    let info = connected_info(a, &first[0], -60);
    assert!(h.select(&improved, &info, true).is_none());
}

#[test]
fn sufficient_5ghz_secured_network_is_kept_after_cooldown() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    h.add("b", SecurityType::Psk);
    let scans = [
        psk_scan("a", "00:00:00:00:00:0a", 5180, -60),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -40),
    ];
    h.select_disconnected(&scans);
    h.past_cooldown();

    let info = connected_info(a, &scans[0], -60);
    assert!(h.select(&scans, &info, true).is_none());
}

#[test]
fn connected_on_24ghz_forces_selection() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    let b = h.add("b", SecurityType::Psk);
    let scans = [
        psk_scan("a", "00:00:00:00:00:0a", 2437, -50),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -50),
    ];
    h.past_cooldown();

    let info = connected_info(a, &scans[0], -50);
    let candidate = h.select(&scans, &info, true).unwrap();
    assert_eq!(candidate.network_id, b);
}

#[test]
fn connected_to_open_network_forces_selection() {
    let mut h = Harness::new();
    let open = h.add("cafe", SecurityType::Open);
    let scans = [ScanResult::new("cafe", "00:00:00:00:00:0c", 5180, "[ESS]", -40)];
    h.past_cooldown();

    let info = connected_info(open, &scans[0], -40);
    assert!(h.select(&scans, &info, true).is_some());
}

#[test]
fn connected_below_qualified_rssi_forces_selection() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    let scans = [psk_scan("a", "00:00:00:00:00:0a", 5180, -75)];

    h.select_disconnected(&scans);
    h.past_cooldown();
    let info = connected_info(a, &scans[0], -75);
    assert!(h.select(&scans, &info, true).is_some());

    // each violation stamps a new selection time
    let info = connected_info(a, &scans[0], -75);
    assert!(h.select(&scans, &info, true).is_none());
}

#[test]
fn blacklisted_bssid_is_never_returned() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    let scans = [
        psk_scan("a", "00:00:00:00:00:01", 5180, -30),
        psk_scan("a", "00:00:00:00:00:02", 5180, -70),
    ];
    h.blacklist.insert("00:00:00:00:00:01".to_string());

    let candidate = h.select_disconnected(&scans).unwrap();
    assert_eq!(candidate.network_id, a);
    assert_eq!(candidate.bssid, "00:00:00:00:00:02");

    h.blacklist.insert("00:00:00:00:00:02".to_string());
    h.past_cooldown();
    assert!(h.select_disconnected(&scans).is_none());
}

#[test]
fn no_selection_when_current_bssid_missing_from_scan() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    h.add("b", SecurityType::Psk);
    h.past_cooldown();

    let current = psk_scan("a", "00:00:00:00:00:0a", 2437, -70);
    let scans = [psk_scan("b", "00:00:00:00:00:0b", 5180, -40)];
    let info = connected_info(a, &current, -70);
    assert!(h.select(&scans, &info, true).is_none());
}

#[test]
fn no_selection_while_connection_is_in_progress() {
    let mut h = Harness::new();
    h.add("a", SecurityType::Psk);
    let scans = [psk_scan("a", "00:00:00:00:00:0a", 5180, -40)];
    let request = SelectionRequest {
        scan_results: &scans,
        blacklist: &h.blacklist,
        wifi_info: &WifiInfo::default(),
        connected: false,
        disconnected: false,
        untrusted_network_allowed: false,
    };
    assert!(h.selector.select_network(&request, &mut h.store).is_none());
}

#[test]
fn disconnected_ignores_cooldown() {
    let mut h = Harness::new();
    h.add("a", SecurityType::Psk);
    let scans = [psk_scan("a", "00:00:00:00:00:0a", 5180, -40)];
    assert!(h.select_disconnected(&scans).is_some());
    assert!(h.select_disconnected(&scans).is_some());
}

#[test]
fn connectable_networks_are_marked_seen() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    let b = h.add("b", SecurityType::Psk);
    let c = h.add("c", SecurityType::Psk);
    let scans = [
        psk_scan("a", "00:00:00:00:00:0a", 5180, -50),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -60),
    ];
    h.select_disconnected(&scans);

    let seen = |id| h.store.get(id).unwrap().selection.seen_in_last_qualified_selection;
    assert!(seen(a));
    assert!(seen(b));
    assert!(!seen(c));
    assert!(h.store.get(b).unwrap().selection.candidate.is_some());
}

#[test]
fn user_connect_choice_propagates_to_seen_networks_only() {
    let mut h = Harness::new();
    let a = h.add("a", SecurityType::Psk);
    let b = h.add("b", SecurityType::Psk);
    let c = h.add("c", SecurityType::Psk);
    let scans = [
        psk_scan("a", "00:00:00:00:00:0a", 5180, -50),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -60),
    ];
    h.select_disconnected(&scans);
    h.store
        .set_connect_choice(b, Some("\"stale\"WPA_PSK".to_string()), Some(1));
    h.store.disable_network(b, DisableReason::ByUser);

    assert!(h.selector.set_user_connect_choice(b, &mut h.store));

    let key_b = h.store.get(b).unwrap().config_key();
    let network_a = h.store.get(a).unwrap();
    assert_eq!(network_a.selection.connect_choice.as_deref(), Some(key_b.as_str()));
    assert!(network_a.selection.connect_choice_timestamp.is_some());

    let network_b = h.store.get(b).unwrap();
    assert!(network_b.selection.is_enabled());
    assert_eq!(network_b.selection.connect_choice, None);

    assert_eq!(h.store.get(c).unwrap().selection.connect_choice, None);
}

#[test]
fn user_connect_choice_for_unknown_network_fails() {
    let mut h = Harness::new();
    h.add("a", SecurityType::Psk);
    assert!(!h.selector.set_user_connect_choice(42, &mut h.store));
}

#[test]
fn user_connect_choice_overrides_the_evaluators() {
    let mut h = Harness::with_evaluator(Box::new(FixedEvaluator { pick: 0 }));
    let a = h.add("a", SecurityType::Psk);
    let b = h.add("b", SecurityType::Psk);
    assert_eq!(a, 0);
    let scans = [
        psk_scan("a", "00:00:00:00:00:0a", 5180, -40),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -70),
    ];

    assert_eq!(h.select_disconnected(&scans).unwrap().network_id, a);
    assert!(h.selector.set_user_connect_choice(b, &mut h.store));

    let candidate = h.select_disconnected(&scans).unwrap();
    assert_eq!(candidate.network_id, b);
    assert_eq!(candidate.bssid, "00:00:00:00:00:0b");
    assert_eq!(candidate.evaluator, USER_CONNECT_CHOICE);
}

#[test]
fn user_choice_absent_from_scan_does_not_override() {
    let mut h = Harness::with_evaluator(Box::new(FixedEvaluator { pick: 0 }));
    let a = h.add("a", SecurityType::Psk);
    let b = h.add("b", SecurityType::Psk);
    let both = [
        psk_scan("a", "00:00:00:00:00:0a", 5180, -40),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -70),
    ];
    h.select_disconnected(&both);
    h.selector.set_user_connect_choice(b, &mut h.store);

    let only_a = [psk_scan("a", "00:00:00:00:00:0a", 5180, -40)];
    assert_eq!(h.select_disconnected(&only_a).unwrap().network_id, a);
}

#[test]
fn evaluators_run_in_priority_order() {
    let clock = ManualClock::new();
    let mut selector = WifiNetworkSelector::new(ScoringParams::default(), Arc::new(clock));
    assert!(!selector.register_evaluator(Box::new(FixedEvaluator { pick: 0 }), MAX_NUM_EVALUATORS));
    assert!(selector.register_evaluator(Box::new(FixedEvaluator { pick: 1 }), 3));
    assert!(selector.register_evaluator(Box::new(FixedEvaluator { pick: 0 }), 2));

    let mut store = SavedNetworkStore::new();
    store.add_or_update(SavedNetwork::new("a", SecurityType::Psk));
    store.add_or_update(SavedNetwork::new("b", SecurityType::Psk));
    let scans = [
        psk_scan("a", "00:00:00:00:00:0a", 5180, -40),
        psk_scan("b", "00:00:00:00:00:0b", 5180, -40),
    ];
    let request = SelectionRequest {
        scan_results: &scans,
        blacklist: &HashSet::new(),
        wifi_info: &WifiInfo::default(),
        connected: false,
        disconnected: true,
        untrusted_network_allowed: false,
    };
    assert_eq!(selector.select_network(&request, &mut store).unwrap().network_id, 0);
}
