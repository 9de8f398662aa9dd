//! Saved network profiles, live link information and radio modes.

use serde::{Deserialize, Serialize};

use crate::scan::{ScanResult, SecurityType};

pub type NetworkId = u32;

/// RSSI reported when there is no link.
pub const INVALID_RSSI: i32 = -127;

/// Operational mode of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RadioMode {
    #[default]
    Disabled,
    ScanOnly,
    ScanOnlyNoWifi,
    Connect,
    SoftApTethered,
    SoftApLocalOnly,
}

impl RadioMode {
    /// Modes served by the authentication daemon.
    pub fn is_client(&self) -> bool {
        matches!(
            self,
            RadioMode::Connect | RadioMode::ScanOnly | RadioMode::ScanOnlyNoWifi
        )
    }

    pub fn is_soft_ap(&self) -> bool {
        matches!(self, RadioMode::SoftApTethered | RadioMode::SoftApLocalOnly)
    }

    pub fn is_scan_only(&self) -> bool {
        matches!(self, RadioMode::ScanOnly | RadioMode::ScanOnlyNoWifi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    #[default]
    Enabled,
    TemporarilyDisabled,
    PermanentlyDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    AuthenticationFailure,
    WrongPassword,
    DhcpFailure,
    AssociationRejection,
    ByUser,
}

impl DisableReason {
    pub fn status(&self) -> SelectionStatus {
        match self {
            DisableReason::WrongPassword | DisableReason::ByUser => {
                SelectionStatus::PermanentlyDisabled
            }
            _ => SelectionStatus::TemporarilyDisabled,
        }
    }
}

/// Selection bookkeeping carried by every saved profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkSelectionStatus {
    pub status: SelectionStatus,
    #[serde(default)]
    pub disable_reason: Option<DisableReason>,
    /// Set when the profile made the connectable list of the last selection.
    #[serde(default)]
    pub seen_in_last_qualified_selection: bool,
    /// Config key of the profile the user picked over this one.
    #[serde(default)]
    pub connect_choice: Option<String>,
    #[serde(default)]
    pub connect_choice_timestamp: Option<u64>,
    #[serde(skip)]
    pub candidate: Option<ScanResult>,
    #[serde(skip)]
    pub candidate_score: Option<i32>,
}

impl NetworkSelectionStatus {
    pub fn is_enabled(&self) -> bool {
        self.status == SelectionStatus::Enabled
    }

    pub fn is_permanently_disabled(&self) -> bool {
        self.status == SelectionStatus::PermanentlyDisabled
    }
}

/// A saved network profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNetwork {
    /// Assigned by the store; `None` until the profile is added.
    #[serde(default)]
    pub network_id: Option<NetworkId>,
    pub ssid: String,
    #[serde(default)]
    pub security: SecurityType,
    #[serde(default, skip_serializing)]
    pub psk: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_trusted")]
    pub trusted: bool,
    #[serde(default)]
    pub has_ever_connected: bool,
    #[serde(default)]
    pub selection: NetworkSelectionStatus,
}

fn default_trusted() -> bool {
    true
}

impl SavedNetwork {
    pub fn new(ssid: &str, security: SecurityType) -> Self {
        Self {
            network_id: None,
            ssid: ssid.to_string(),
            security,
            psk: None,
            hidden: false,
            trusted: true,
            has_ever_connected: false,
            selection: NetworkSelectionStatus::default(),
        }
    }

    pub fn with_psk(mut self, psk: &str) -> Self {
        self.psk = Some(psk.to_string());
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Identity of the profile: quoted SSID followed by key management.
    pub fn config_key(&self) -> String {
        config_key(&self.ssid, self.security)
    }

    /// Whether a scan result advertises this profile.
    pub fn matches(&self, scan: &ScanResult) -> bool {
        scan.ssid == self.ssid && scan.security().key_mgmt() == self.security.key_mgmt()
    }
}

pub fn config_key(ssid: &str, security: SecurityType) -> String {
    format!("\"{}\"{}", ssid, security.key_mgmt())
}

/// Link state reported by the authentication daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SupplicantState {
    #[default]
    Disconnected,
    InterfaceDisabled,
    Inactive,
    Scanning,
    Authenticating,
    Associating,
    Associated,
    FourWayHandshake,
    GroupHandshake,
    Completed,
    Uninitialized,
}

/// Live information about the current link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiInfo {
    pub network_id: Option<NetworkId>,
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub supplicant_state: SupplicantState,
    pub rssi: i32,
    /// Mbps
    pub link_speed: i32,
    pub frequency: u32,
    /// Packets per second, smoothed by the driver.
    pub tx_success_rate: f64,
    pub tx_bad_rate: f64,
    pub rx_success_rate: f64,
    pub ip_address: Option<String>,
}

impl Default for WifiInfo {
    fn default() -> Self {
        Self {
            network_id: None,
            ssid: None,
            bssid: None,
            supplicant_state: SupplicantState::Disconnected,
            rssi: INVALID_RSSI,
            link_speed: -1,
            frequency: 0,
            tx_success_rate: 0.0,
            tx_bad_rate: 0.0,
            rx_success_rate: 0.0,
            ip_address: None,
        }
    }
}

impl WifiInfo {
    pub fn reset(&mut self) {
        *self = WifiInfo::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_key_uses_quoted_ssid_and_key_mgmt() {
        let psk = SavedNetwork::new("home", SecurityType::Psk);
        assert_eq!(psk.config_key(), "\"home\"WPA_PSK");
        let open = SavedNetwork::new("cafe", SecurityType::Open);
        assert_eq!(open.config_key(), "\"cafe\"NONE");
    }

    #[test]
    fn matches_requires_same_security_class() {
        let psk = SavedNetwork::new("home", SecurityType::Psk);
        let scan = ScanResult::new("home", "aa:bb:cc:dd:ee:ff", 2412, "[WPA2-PSK-CCMP]", -50);
        let open_scan = ScanResult::new("home", "aa:bb:cc:dd:ee:01", 2412, "[ESS]", -50);
        assert!(psk.matches(&scan));
        assert!(!psk.matches(&open_scan));
    }

    #[test]
    fn wifi_info_reset_clears_link() {
        let mut info = WifiInfo {
            bssid: Some("aa:bb:cc:dd:ee:ff".into()),
            supplicant_state: SupplicantState::Completed,
            rssi: -50,
            ..WifiInfo::default()
        };
        info.reset();
        assert_eq!(info.bssid, None);
        assert_eq!(info.supplicant_state, SupplicantState::Disconnected);
        assert_eq!(info.rssi, INVALID_RSSI);
    }

    #[test]
    fn psk_is_not_serialized() {
        let network = SavedNetwork::new("home", SecurityType::Psk).with_psk("secret");
        let json = serde_json::to_string(&network).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn disable_reasons_map_to_status() {
        assert_eq!(DisableReason::WrongPassword.status(), SelectionStatus::PermanentlyDisabled);
        assert_eq!(DisableReason::DhcpFailure.status(), SelectionStatus::TemporarilyDisabled);
    }
}
