//! Scan results and scan requests.
//!
//! A [`ScanResult`] is one beacon/probe response as reported by the driver:
//! one BSSID on one channel. The helpers here derive the band and the
//! security class that the selector and the PNO builder work from.
//!
//! # Example
//!
//! ```
//! use wifi_manager::scan::{Band, ScanResult, SecurityType};
//!
//! let result = ScanResult::new("home", "6c:f3:7f:ae:8c:f3", 5180, "[WPA2-PSK-CCMP][ESS]", -60);
//! assert_eq!(result.band(), Band::FiveGhz);
//! assert_eq!(result.security(), SecurityType::Psk);
//! ```

use serde::{Deserialize, Serialize};

/// Scan requests report after each scan completes.
pub const REPORT_EVENT_AFTER_EACH_SCAN: u8 = 0x1;
/// Scan requests report full (not truncated) results.
pub const REPORT_EVENT_FULL_SCAN_RESULT: u8 = 0x2;

/// One access point seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Hardware address of the access point, lower case colon separated.
    pub bssid: String,

    /// Network name. Empty for hidden networks that did not answer a probe.
    pub ssid: String,

    /// Channel center frequency in MHz.
    pub frequency: u32,

    /// Capability flags as bracketed tokens, e.g. `[WPA2-PSK-CCMP][ESS]`.
    pub capabilities: String,

    /// Received signal level in dBm.
    pub level: i32,

    /// Time the result was seen, in microseconds since boot.
    #[serde(default)]
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    TwoPointFourGhz,
    FiveGhz,
    Other,
}

/// Security class of a network, as far as selection is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    #[default]
    Open,
    Wep,
    Psk,
    Eap,
}

impl SecurityType {
    /// Parses the bracketed capability string of a scan result.
    pub fn from_capabilities(capabilities: &str) -> Self {
        if capabilities.contains("PSK") || capabilities.contains("SAE") {
            SecurityType::Psk
        } else if capabilities.contains("EAP") {
            SecurityType::Eap
        } else if capabilities.contains("WEP") {
            SecurityType::Wep
        } else {
            SecurityType::Open
        }
    }

    /// Key management name used in profile identity keys.
    pub fn key_mgmt(&self) -> &'static str {
        match self {
            SecurityType::Open | SecurityType::Wep => "NONE",
            SecurityType::Psk => "WPA_PSK",
            SecurityType::Eap => "WPA_EAP",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SecurityType::Open)
    }
}

pub fn is_24ghz(frequency: u32) -> bool {
    (2400..=2500).contains(&frequency)
}

pub fn is_5ghz(frequency: u32) -> bool {
    (4900..=5900).contains(&frequency)
}

pub fn band_of(frequency: u32) -> Band {
    if is_24ghz(frequency) {
        Band::TwoPointFourGhz
    } else if is_5ghz(frequency) {
        Band::FiveGhz
    } else {
        Band::Other
    }
}

impl ScanResult {
    pub fn new(ssid: &str, bssid: &str, frequency: u32, capabilities: &str, level: i32) -> Self {
        Self {
            bssid: bssid.to_string(),
            ssid: ssid.to_string(),
            frequency,
            capabilities: capabilities.to_string(),
            level,
            timestamp_us: 0,
        }
    }

    pub fn band(&self) -> Band {
        band_of(self.frequency)
    }

    pub fn is_24ghz(&self) -> bool {
        is_24ghz(self.frequency)
    }

    pub fn is_5ghz(&self) -> bool {
        is_5ghz(self.frequency)
    }

    pub fn security(&self) -> SecurityType {
        SecurityType::from_capabilities(&self.capabilities)
    }
}

/// Band selection for a scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanBand {
    /// Use the explicit channel list.
    Unspecified,
    TwoPointFourGhz,
    FiveGhz,
    Both,
    BothWithDfs,
}

/// A scan request handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub band: ScanBand,
    /// Channel frequencies in MHz, only used with [`ScanBand::Unspecified`].
    pub channels: Vec<u32>,
    /// SSIDs to probe for directly.
    pub hidden_networks: Vec<String>,
    /// Bitwise OR of the `REPORT_EVENT_*` flags.
    pub report_events: u8,
}

/// Displays scan results as a table, strongest first.
pub fn display_scan_results(results: &[ScanResult]) {
    if results.is_empty() {
        println!("No networks found.");
        return;
    }

    let mut sorted: Vec<&ScanResult> = results.iter().collect();
    sorted.sort_by(|a, b| b.level.cmp(&a.level));

    println!(
        "{:<32} {:<17} {:>5} {:>9} {:<8}",
        "SSID", "BSSID", "FREQ", "SIGNAL", "SECURITY"
    );
    println!("{}", "-".repeat(80));

    for result in sorted {
        println!(
            "{:<32} {:<17} {:>5} {:>4} {} {:<8}",
            truncate_ssid(&result.ssid, 32),
            result.bssid,
            result.frequency,
            result.level,
            signal_to_bar(result.level),
            format!("{:?}", result.security()),
        );
    }
}

fn truncate_ssid(ssid: &str, max_len: usize) -> String {
    if ssid.chars().count() > max_len {
        let head: String = ssid.chars().take(max_len - 3).collect();
        format!("{}...", head)
    } else {
        ssid.to_string()
    }
}

/// Four segment signal bar for a level in dBm.
fn signal_to_bar(level: i32) -> &'static str {
    match level {
        -55..=0 => "████",
        -66..=-56 => "███░",
        -77..=-67 => "██░░",
        -88..=-78 => "█░░░",
        _ => "░░░░",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries() {
        assert_eq!(band_of(2412), Band::TwoPointFourGhz);
        assert_eq!(band_of(2484), Band::TwoPointFourGhz);
        assert_eq!(band_of(5180), Band::FiveGhz);
        assert_eq!(band_of(5825), Band::FiveGhz);
        assert_eq!(band_of(60480), Band::Other);
    }

    #[test]
    fn security_from_capabilities() {
        assert_eq!(SecurityType::from_capabilities("[WPA2-PSK-CCMP][ESS]"), SecurityType::Psk);
        assert_eq!(SecurityType::from_capabilities("[WPA2-EAP-CCMP][ESS]"), SecurityType::Eap);
        assert_eq!(SecurityType::from_capabilities("[WEP][ESS]"), SecurityType::Wep);
        assert_eq!(SecurityType::from_capabilities("[ESS]"), SecurityType::Open);
        assert_eq!(SecurityType::from_capabilities(""), SecurityType::Open);
    }

    #[test]
    fn signal_bar_thresholds() {
        assert_eq!(signal_to_bar(-40), "████");
        assert_eq!(signal_to_bar(-70), "██░░");
        assert_eq!(signal_to_bar(-95), "░░░░");
    }

    #[test]
    fn truncate_keeps_short_names() {
        assert_eq!(truncate_ssid("Short", 10), "Short");
        assert_eq!(truncate_ssid("VeryLongNetworkName", 10), "VeryLon...");
    }
}
