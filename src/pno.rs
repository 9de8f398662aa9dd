//! Background (PNO) scan requests built from saved profiles.

use std::cmp::Ordering;

use serde::Serialize;

use crate::network::SavedNetwork;
use crate::scan::SecurityType;

pub const FLAG_DIRECTED_SCAN: u8 = 0x1;
pub const FLAG_A_BAND: u8 = 0x2;
pub const FLAG_G_BAND: u8 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthCode {
    Open,
    Psk,
    Eapol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PnoNetwork {
    pub ssid: String,
    pub flags: u8,
    pub auth: AuthCode,
}

impl PnoNetwork {
    pub fn from_saved(network: &SavedNetwork) -> Self {
        let mut flags = FLAG_A_BAND | FLAG_G_BAND;
        if network.hidden {
            flags |= FLAG_DIRECTED_SCAN;
        }
        let auth = match network.security {
            SecurityType::Psk => AuthCode::Psk,
            SecurityType::Eap => AuthCode::Eapol,
            SecurityType::Open | SecurityType::Wep => AuthCode::Open,
        };
        Self {
            ssid: network.ssid.clone(),
            flags,
            auth,
        }
    }

    pub fn is_directed(&self) -> bool {
        self.flags & FLAG_DIRECTED_SCAN != 0
    }
}

/// Orders profiles enabled first, then temporarily disabled, then
/// permanently disabled; `tie_break` orders profiles of the same status.
pub fn compare_by_status<F>(a: &SavedNetwork, b: &SavedNetwork, tie_break: F) -> Ordering
where
    F: FnOnce(&SavedNetwork, &SavedNetwork) -> Ordering,
{
    a.selection
        .status
        .cmp(&b.selection.status)
        .then_with(|| tie_break(a, b))
}

/// PNO list for the current saved profiles. Permanently disabled profiles
/// are left out; profiles that have connected before come first within a
/// status class.
pub fn pno_networks(saved: &[SavedNetwork]) -> Vec<PnoNetwork> {
    let mut candidates: Vec<&SavedNetwork> = saved
        .iter()
        .filter(|n| !n.selection.is_permanently_disabled())
        .collect();
    candidates.sort_by(|a, b| {
        compare_by_status(a, b, |a, b| b.has_ever_connected.cmp(&a.has_ever_connected))
    });
    candidates.into_iter().map(PnoNetwork::from_saved).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SelectionStatus;

    fn network(ssid: &str, security: SecurityType, status: SelectionStatus) -> SavedNetwork {
        let mut network = SavedNetwork::new(ssid, security);
        network.selection.status = status;
        network
    }

    #[test]
    fn bands_always_set_and_directed_only_for_hidden() {
        let visible = PnoNetwork::from_saved(&SavedNetwork::new("a", SecurityType::Psk));
        assert_eq!(visible.flags, FLAG_A_BAND | FLAG_G_BAND);
        assert!(!visible.is_directed());

        let hidden =
            PnoNetwork::from_saved(&SavedNetwork::new("b", SecurityType::Psk).with_hidden(true));
        assert_eq!(hidden.flags, FLAG_A_BAND | FLAG_G_BAND | FLAG_DIRECTED_SCAN);
    }

    #[test]
    fn auth_code_follows_security() {
        let auth = |security| PnoNetwork::from_saved(&SavedNetwork::new("a", security)).auth;
        assert_eq!(auth(SecurityType::Open), AuthCode::Open);
        assert_eq!(auth(SecurityType::Wep), AuthCode::Open);
        assert_eq!(auth(SecurityType::Psk), AuthCode::Psk);
        assert_eq!(auth(SecurityType::Eap), AuthCode::Eapol);
    }

    #[test]
    fn comparator_orders_by_status_then_tie_break() {
        let enabled = network("e", SecurityType::Psk, SelectionStatus::Enabled);
        let temp = network("t", SecurityType::Psk, SelectionStatus::TemporarilyDisabled);
        let perm = network("p", SecurityType::Psk, SelectionStatus::PermanentlyDisabled);

        let by_name = |a: &SavedNetwork, b: &SavedNetwork| a.ssid.cmp(&b.ssid);
        assert_eq!(compare_by_status(&enabled, &temp, by_name), Ordering::Less);
        assert_eq!(compare_by_status(&perm, &temp, by_name), Ordering::Greater);

        let other = network("a", SecurityType::Psk, SelectionStatus::Enabled);
        assert_eq!(compare_by_status(&enabled, &other, by_name), Ordering::Greater);
    }

    #[test]
    fn pno_list_skips_permanently_disabled() {
        let mut connected = network("c", SecurityType::Psk, SelectionStatus::Enabled);
        connected.has_ever_connected = true;
        let saved = vec![
            network("t", SecurityType::Psk, SelectionStatus::TemporarilyDisabled),
            network("p", SecurityType::Psk, SelectionStatus::PermanentlyDisabled),
            network("n", SecurityType::Open, SelectionStatus::Enabled),
            connected,
        ];
        let ssids: Vec<String> = pno_networks(&saved).into_iter().map(|n| n.ssid).collect();
        assert_eq!(ssids, vec!["c", "n", "t"]);
    }
}
