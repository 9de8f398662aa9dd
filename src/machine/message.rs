use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::driver::DhcpResults;
use crate::metrics::WifiMetrics;
use crate::network::{NetworkId, RadioMode, SavedNetwork, SupplicantState, WifiInfo};
use crate::notify::{ApFailure, ApState, WifiState};
use crate::recovery::RecoveryReason;
use crate::scan::ScanResult;
use crate::store::NetworkUpdateResult;

use super::log_recs::LogRec;

pub type MessageSender = mpsc::UnboundedSender<Message>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Message>;

/// One-shot reply channel carried by request messages.
pub type Reply<T> = oneshot::Sender<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFailure {
    InvalidArgs,
    Busy,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "reason")]
pub enum ActionResult {
    Succeeded,
    Failed(ActionFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsSetup {
    PushButton,
    PinDisplay,
    PinKeypad,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpsInfo {
    pub setup: WpsSetup,
    #[serde(default)]
    pub bssid: Option<String>,
    /// Required for keypad setup.
    #[serde(default)]
    pub pin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsFailure {
    Error,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WpsResult {
    Started { pin: Option<String> },
    Failed(WpsFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
    Timeout,
    WrongPassword,
    EapFailure,
    Unknown,
}

/// Snapshot of the machine handed out by `GetStatus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadioStatus {
    pub mode: RadioMode,
    pub state: &'static str,
    pub wifi_state: WifiState,
    pub ap_state: ApState,
    pub interface: Option<String>,
    pub wifi_info: WifiInfo,
    pub verbose_logging: bool,
}

/// Everything the state machine reacts to: caller commands, driver and
/// provisioning events, and its own timers.
#[derive(Debug)]
pub enum Message {
    // commands
    SetMode(RadioMode),
    Initialize {
        reply: Reply<bool>,
    },
    AddOrUpdateNetwork {
        network: SavedNetwork,
        reply: Reply<Option<NetworkUpdateResult>>,
    },
    RemoveNetwork {
        network_id: NetworkId,
        reply: Reply<bool>,
    },
    EnableNetwork {
        network_id: NetworkId,
        disable_others: bool,
        reply: Reply<bool>,
    },
    DisableNetwork {
        network_id: NetworkId,
        reply: Reply<bool>,
    },
    ConnectNetwork {
        network_id: NetworkId,
        reply: Reply<ActionResult>,
    },
    Reconnect,
    Disconnect,
    StartScan {
        channels: Option<Vec<u32>>,
    },
    StartWps {
        info: Option<WpsInfo>,
        reply: Reply<WpsResult>,
    },
    CancelWps,
    GetConfiguredNetworks {
        reply: Reply<Vec<SavedNetwork>>,
    },
    GetScanResults {
        reply: Reply<Vec<ScanResult>>,
    },
    GetSupportedFeatures {
        reply: Reply<u32>,
    },
    GetStatus {
        reply: Reply<RadioStatus>,
    },
    GetMetrics {
        reply: Reply<WifiMetrics>,
    },
    GetLogRecs {
        reply: Reply<Vec<LogRec>>,
    },
    EnableVerboseLogging(bool),
    RestartWifiStack {
        reason: RecoveryReason,
    },

    // authentication daemon and driver events
    SupplicantConnected,
    SupplicantDisconnected,
    NetworkConnected {
        bssid: String,
    },
    NetworkDisconnected {
        bssid: Option<String>,
        reason_code: i32,
        locally_generated: bool,
    },
    AuthenticationFailure {
        reason: AuthFailureReason,
    },
    SupplicantStateChanged {
        state: SupplicantState,
        ssid: Option<String>,
        bssid: Option<String>,
    },
    ScanResultsAvailable,
    ScanFailed,
    WpsFailed,
    WpsTimeout,
    VendorHalDied,
    WificondDied,
    SoftApStateChanged {
        state: ApState,
        failure: Option<ApFailure>,
    },

    // IP provisioning
    IpProvisioningSuccess(DhcpResults),
    IpProvisioningFailure,

    // timers
    RssiPoll {
        token: u64,
    },
    DisconnectingWatchdog {
        token: u64,
    },
    RestartSupplicant,
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::SetMode(_) => "SetMode",
            Message::Initialize { .. } => "Initialize",
            Message::AddOrUpdateNetwork { .. } => "AddOrUpdateNetwork",
            Message::RemoveNetwork { .. } => "RemoveNetwork",
            Message::EnableNetwork { .. } => "EnableNetwork",
            Message::DisableNetwork { .. } => "DisableNetwork",
            Message::ConnectNetwork { .. } => "ConnectNetwork",
            Message::Reconnect => "Reconnect",
            Message::Disconnect => "Disconnect",
            Message::StartScan { .. } => "StartScan",
            Message::StartWps { .. } => "StartWps",
            Message::CancelWps => "CancelWps",
            Message::GetConfiguredNetworks { .. } => "GetConfiguredNetworks",
            Message::GetScanResults { .. } => "GetScanResults",
            Message::GetSupportedFeatures { .. } => "GetSupportedFeatures",
            Message::GetStatus { .. } => "GetStatus",
            Message::GetMetrics { .. } => "GetMetrics",
            Message::GetLogRecs { .. } => "GetLogRecs",
            Message::EnableVerboseLogging(_) => "EnableVerboseLogging",
            Message::RestartWifiStack { .. } => "RestartWifiStack",
            Message::SupplicantConnected => "SupplicantConnected",
            Message::SupplicantDisconnected => "SupplicantDisconnected",
            Message::NetworkConnected { .. } => "NetworkConnected",
            Message::NetworkDisconnected { .. } => "NetworkDisconnected",
            Message::AuthenticationFailure { .. } => "AuthenticationFailure",
            Message::SupplicantStateChanged { .. } => "SupplicantStateChanged",
            Message::ScanResultsAvailable => "ScanResultsAvailable",
            Message::ScanFailed => "ScanFailed",
            Message::WpsFailed => "WpsFailed",
            Message::WpsTimeout => "WpsTimeout",
            Message::VendorHalDied => "VendorHalDied",
            Message::WificondDied => "WificondDied",
            Message::SoftApStateChanged { .. } => "SoftApStateChanged",
            Message::IpProvisioningSuccess(_) => "IpProvisioningSuccess",
            Message::IpProvisioningFailure => "IpProvisioningFailure",
            Message::RssiPoll { .. } => "RssiPoll",
            Message::DisconnectingWatchdog { .. } => "DisconnectingWatchdog",
            Message::RestartSupplicant => "RestartSupplicant",
        }
    }
}

/// Sends a reply, ignoring callers that stopped waiting.
pub(crate) fn reply<T>(tx: Reply<T>, value: T) {
    let _ = tx.send(value);
}
