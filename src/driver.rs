//! Interfaces to the radio driver, the authentication daemon, the IP
//! provisioning client and the soft AP.
//!
//! Calls return as soon as the request is issued. Outcomes (daemon up,
//! link up, lease obtained, AP enabled...) arrive later as
//! [`Message`](crate::machine::Message)s on the state machine's queue.

use anyhow::Result;
use serde::Serialize;

use crate::config::SoftApConfig;
use crate::network::{RadioMode, SavedNetwork};
use crate::pno::PnoNetwork;
use crate::scan::{ScanResult, ScanSettings};

pub const FEATURE_INFRA: u32 = 0x0001;
pub const FEATURE_INFRA_5G: u32 = 0x0002;
pub const FEATURE_PASSPOINT: u32 = 0x0004;
pub const FEATURE_P2P: u32 = 0x0008;
pub const FEATURE_MOBILE_HOTSPOT: u32 = 0x0010;
pub const FEATURE_SCANNER: u32 = 0x0020;
pub const FEATURE_AWARE: u32 = 0x0040;
pub const FEATURE_D2D_RTT: u32 = 0x0080;
pub const FEATURE_D2AP_RTT: u32 = 0x0100;

/// Live link numbers sampled by a signal poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalPoll {
    pub rssi: i32,
    pub link_speed: i32,
    pub frequency: u32,
    pub tx_success_rate: f64,
    pub tx_bad_rate: f64,
    pub rx_success_rate: f64,
}

/// Lease data delivered with a provisioning success.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DhcpResults {
    /// Address with prefix length, e.g. `192.168.1.20/24`.
    pub ip_address: String,
    pub gateway: Option<String>,
    pub dns_servers: Vec<String>,
    pub lease_duration_secs: Option<u32>,
}

pub trait RadioDriver: Send {
    /// Brings up a station interface and returns its name.
    fn setup_client_interface(&mut self) -> Result<String>;
    /// Brings up an access point interface and returns its name.
    fn setup_soft_ap_interface(&mut self) -> Result<String>;
    /// Stops the daemon if it is running and releases every interface.
    /// Reports nothing back.
    fn teardown_interfaces(&mut self);
    fn initialize_vendor_hal(&mut self) -> bool;

    /// Starts the authentication daemon; completion is reported with
    /// `SupplicantConnected` or `SupplicantDisconnected`.
    fn enable_supplicant(&mut self) -> Result<()>;
    /// Stops the daemon; completion is reported with `SupplicantDisconnected`.
    fn disable_supplicant(&mut self) -> Result<()>;

    fn remove_all_networks(&mut self) -> Result<()>;
    fn connect_to_network(&mut self, network: &SavedNetwork) -> Result<()>;
    fn roam_to_network(&mut self, network: &SavedNetwork, bssid: &str) -> Result<()>;
    fn reconnect(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;

    fn start_scan(&mut self, settings: &ScanSettings) -> Result<()>;
    fn scan_results(&mut self) -> Vec<ScanResult>;
    fn start_pno_scan(&mut self, networks: &[PnoNetwork]) -> Result<()>;
    fn stop_pno_scan(&mut self) -> Result<()>;

    fn start_wps_pbc(&mut self, bssid: Option<&str>) -> Result<()>;
    /// Returns the PIN to show to the user.
    fn start_wps_pin_display(&mut self, bssid: Option<&str>) -> Result<String>;
    fn start_wps_pin_keypad(&mut self, pin: &str) -> Result<()>;
    fn cancel_wps(&mut self) -> Result<()>;
    /// Networks the daemon learned on its own, e.g. through WPS.
    fn migrate_networks(&mut self) -> Vec<SavedNetwork>;

    fn supported_features(&mut self) -> u32;
    fn signal_poll(&mut self) -> Option<SignalPoll>;
}

pub trait IpClient: Send {
    /// Starts provisioning; reports `IpProvisioningSuccess` or
    /// `IpProvisioningFailure`.
    fn start_provisioning(&mut self, interface: &str);
    /// Stops provisioning; outcomes of earlier starts are dropped.
    fn stop(&mut self);
}

pub trait SoftApManager: Send {
    /// Starts the AP; state changes arrive as `SoftApStateChanged`.
    fn start(&mut self, interface: &str, config: &SoftApConfig, mode: RadioMode) -> Result<()>;
    fn stop(&mut self);
}
