use crate::config::ScoringParams;
use crate::network::{NetworkId, SavedNetwork};
use crate::scan::ScanResult;
use crate::store::ConfigStore;

use super::{EvaluationContext, NetworkCandidate, NetworkEvaluator};

/// Scores saved, enabled profiles by signal, band, security and recency of
/// the user's last pick.
pub struct SavedNetworkEvaluator {
    params: ScoringParams,
}

impl SavedNetworkEvaluator {
    pub const NAME: &'static str = "SavedNetworkEvaluator";

    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    fn score(
        &self,
        scan: &ScanResult,
        network: &SavedNetwork,
        network_id: NetworkId,
        ctx: &EvaluationContext<'_>,
        last_selected: Option<(NetworkId, u64)>,
    ) -> i32 {
        let p = &self.params;
        let five = scan.is_5ghz();

        let rssi = scan.level.min(p.good_rssi(five));
        let mut score = (rssi + p.rssi_score_offset) * p.rssi_score_slope;

        if five {
            score += p.band_5ghz_award;
        }

        if let Some((last_id, at_millis)) = last_selected {
            if last_id == network_id {
                let now_millis = ctx.now.as_millis() as u64;
                let minutes = (now_millis.saturating_sub(at_millis) / 60_000) as i32;
                score += (p.last_selection_award - minutes).max(0);
            }
        }

        if ctx.current_network_id == Some(network_id) {
            score += p.current_network_boost;
            if ctx.current_bssid == Some(scan.bssid.as_str()) {
                score += p.same_bssid_award;
            }
        }

        if !network.security.is_open() {
            score += p.security_award;
        }

        score
    }
}

impl NetworkEvaluator for SavedNetworkEvaluator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(
        &mut self,
        ctx: &EvaluationContext<'_>,
        store: &dyn ConfigStore,
        connectable: &mut Vec<NetworkCandidate>,
    ) -> Option<NetworkCandidate> {
        let last_selected = store.last_selected();
        let mut best: Option<NetworkCandidate> = None;

        for m in ctx.matches {
            // first usable profile per scan entry; matches come best status first
            let usable = m.network_ids.iter().find_map(|&id| {
                let network = store.get(id)?;
                let allowed = network.trusted || ctx.untrusted_network_allowed;
                (network.selection.is_enabled() && allowed).then_some((id, network))
            });
            let Some((id, network)) = usable else {
                continue;
            };

            let candidate = NetworkCandidate {
                network_id: id,
                ssid: network.ssid.clone(),
                bssid: m.scan.bssid.clone(),
                security: network.security,
                score: self.score(&m.scan, network, id, ctx, last_selected),
                evaluator: Self::NAME,
            };

            if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate.clone());
            }
            connectable.push(candidate);
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{DisableReason, SavedNetwork};
    use crate::scan::SecurityType;
    use crate::selector::ScanMatch;
    use crate::store::SavedNetworkStore;
    use std::time::Duration;

    fn setup(networks: &[(&str, SecurityType)]) -> (SavedNetworkStore, Vec<NetworkId>) {
        let mut store = SavedNetworkStore::new();
        let ids = networks
            .iter()
            .map(|(ssid, security)| {
                store
                    .add_or_update(SavedNetwork::new(ssid, *security))
                    .unwrap()
                    .network_id
            })
            .collect();
        (store, ids)
    }

    fn ctx(matches: &[ScanMatch]) -> EvaluationContext<'_> {
        EvaluationContext {
            matches,
            current_network_id: None,
            current_bssid: None,
            connected: false,
            disconnected: true,
            untrusted_network_allowed: false,
            now: Duration::from_secs(600),
        }
    }

    fn scan_match(ssid: &str, bssid: &str, freq: u32, caps: &str, level: i32, ids: &[NetworkId]) -> ScanMatch {
        ScanMatch {
            scan: ScanResult::new(ssid, bssid, freq, caps, level),
            network_ids: ids.to_vec(),
        }
    }

    #[test]
    fn stronger_signal_wins_on_same_band() {
        let (store, ids) = setup(&[("a", SecurityType::Psk), ("b", SecurityType::Psk)]);
        let matches = vec![
            scan_match("a", "00:00:00:00:00:01", 2437, "[WPA2-PSK]", -80, &ids[0..1]),
            scan_match("b", "00:00:00:00:00:02", 2437, "[WPA2-PSK]", -65, &ids[1..2]),
        ];
        let mut evaluator = SavedNetworkEvaluator::new(ScoringParams::default());
        let mut connectable = Vec::new();
        let pick = evaluator.evaluate(&ctx(&matches), &store, &mut connectable).unwrap();

        assert_eq!(pick.network_id, ids[1]);
        // (-65 + 85) * 4 + 80
        assert_eq!(pick.score, 160);
        assert_eq!(connectable.len(), 2);
    }

    #[test]
    fn five_ghz_award_beats_slightly_stronger_2g() {
        let (store, ids) = setup(&[("a", SecurityType::Psk), ("b", SecurityType::Psk)]);
        let matches = vec![
            scan_match("a", "00:00:00:00:00:01", 2437, "[WPA2-PSK]", -65, &ids[0..1]),
            scan_match("b", "00:00:00:00:00:02", 5180, "[WPA2-PSK]", -70, &ids[1..2]),
        ];
        let mut evaluator = SavedNetworkEvaluator::new(ScoringParams::default());
        let pick = evaluator
            .evaluate(&ctx(&matches), &store, &mut Vec::new())
            .unwrap();
        assert_eq!(pick.network_id, ids[1]);
    }

    #[test]
    fn disabled_and_untrusted_profiles_are_skipped() {
        let (mut store, ids) = setup(&[("a", SecurityType::Psk), ("b", SecurityType::Psk)]);
        store.disable_network(ids[0], DisableReason::DhcpFailure);
        let mut untrusted = store.get(ids[1]).unwrap().clone();
        untrusted.trusted = false;
        store.add_or_update(untrusted);

        let matches = vec![
            scan_match("a", "00:00:00:00:00:01", 5180, "[WPA2-PSK]", -50, &ids[0..1]),
            scan_match("b", "00:00:00:00:00:02", 5180, "[WPA2-PSK]", -50, &ids[1..2]),
        ];
        let mut evaluator = SavedNetworkEvaluator::new(ScoringParams::default());
        let mut connectable = Vec::new();
        assert!(evaluator.evaluate(&ctx(&matches), &store, &mut connectable).is_none());
        assert!(connectable.is_empty());

        let mut allowing = ctx(&matches);
        allowing.untrusted_network_allowed = true;
        let pick = evaluator.evaluate(&allowing, &store, &mut connectable).unwrap();
        assert_eq!(pick.network_id, ids[1]);
    }

    #[test]
    fn recent_user_selection_is_rewarded() {
        let (mut store, ids) = setup(&[("a", SecurityType::Psk), ("b", SecurityType::Psk)]);
        // selected 5 minutes before the round
        store.set_last_selected(ids[0], 300_000);
        let matches = vec![
            scan_match("a", "00:00:00:00:00:01", 2437, "[WPA2-PSK]", -80, &ids[0..1]),
            scan_match("b", "00:00:00:00:00:02", 5180, "[WPA2-PSK]", -50, &ids[1..2]),
        ];
        let mut evaluator = SavedNetworkEvaluator::new(ScoringParams::default());
        let pick = evaluator
            .evaluate(&ctx(&matches), &store, &mut Vec::new())
            .unwrap();
        assert_eq!(pick.network_id, ids[0]);
        // (-80 + 85) * 4 + 480 - 5 + 80
        assert_eq!(pick.score, 575);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let (store, ids) = setup(&[("a", SecurityType::Psk), ("b", SecurityType::Psk)]);
        let matches = vec![
            scan_match("a", "00:00:00:00:00:01", 5180, "[WPA2-PSK]", -60, &ids[0..1]),
            scan_match("b", "00:00:00:00:00:02", 5180, "[WPA2-PSK]", -60, &ids[1..2]),
        ];
        let mut evaluator = SavedNetworkEvaluator::new(ScoringParams::default());
        let pick = evaluator
            .evaluate(&ctx(&matches), &store, &mut Vec::new())
            .unwrap();
        assert_eq!(pick.network_id, ids[0]);
    }

    #[test]
    fn current_network_gets_boosts() {
        let (store, ids) = setup(&[("a", SecurityType::Open)]);
        let matches = vec![scan_match("a", "00:00:00:00:00:01", 5180, "[ESS]", -40, &ids)];
        let mut connected = ctx(&matches);
        connected.current_network_id = Some(ids[0]);
        connected.current_bssid = Some("00:00:00:00:00:01");

        let mut evaluator = SavedNetworkEvaluator::new(ScoringParams::default());
        let pick = evaluator
            .evaluate(&connected, &store, &mut Vec::new())
            .unwrap();
        // saturated at -57: (28 * 4) + 40 + 16 + 24
        assert_eq!(pick.score, 192);
    }
}
