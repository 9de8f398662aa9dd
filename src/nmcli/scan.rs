use anyhow::{Context, Result};
use std::thread;
use std::time::Duration;

use crate::scan::ScanResult;

use super::{leading_number, run, signal_to_dbm, split_terse};

const LIST_FIELDS: &str = "IN-USE,BSSID,SSID,FREQ,SIGNAL,RATE,SECURITY";

/// One row of `nmcli device wifi list`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AccessPoint {
    pub in_use: bool,
    pub scan: ScanResult,
    /// Mbps, 0 when unknown.
    pub rate: u32,
}

/// Asks NetworkManager to rescan, probing `hidden_ssids` directly.
pub(crate) fn request_rescan(interface: &str, hidden_ssids: &[String]) -> Result<()> {
    let mut args = vec!["device", "wifi", "rescan", "ifname", interface];
    for ssid in hidden_ssids {
        args.push("ssid");
        args.push(ssid);
    }
    run(&args).context("Failed to trigger rescan")?;
    Ok(())
}

/// Current scan cache, without triggering a new scan.
pub(crate) fn list_access_points(interface: &str) -> Result<Vec<AccessPoint>> {
    let stdout = run(&[
        "-t", "-f", LIST_FIELDS, "device", "wifi", "list", "ifname", interface, "--rescan", "no",
    ])?;
    Ok(stdout.lines().filter_map(parse_access_point).collect())
}

/// Rescans and returns what was found. Blocks for a couple of seconds.
pub fn scan_networks(interface: &str) -> Result<Vec<ScanResult>> {
    // a rescan can be refused right after another one
    let _ = request_rescan(interface, &[]);
    thread::sleep(Duration::from_secs(2));

    Ok(list_access_points(interface)?
        .into_iter()
        .map(|ap| ap.scan)
        .collect())
}

fn parse_access_point(line: &str) -> Option<AccessPoint> {
    let parts = split_terse(line);
    if parts.len() < 7 {
        return None;
    }

    let bssid = parts[1].to_lowercase();
    if bssid.is_empty() {
        return None;
    }
    let frequency = leading_number(&parts[3])?;
    let quality: u8 = parts[4].parse().ok()?;

    let scan = ScanResult::new(
        &parts[2],
        &bssid,
        frequency,
        &capabilities_from_security(&parts[6]),
        signal_to_dbm(quality),
    );

    Some(AccessPoint {
        in_use: parts[0] == "*",
        scan,
        rate: leading_number(&parts[5]).unwrap_or(0),
    })
}

/// Turns nmcli's SECURITY column (e.g. "WPA1 WPA2", "WPA2 802.1X", "WPA3")
/// into a capabilities string.
fn capabilities_from_security(security: &str) -> String {
    let security = security.trim();
    if security.contains("802.1X") {
        "[WPA2-EAP-CCMP][ESS]".to_string()
    } else if security.contains("WPA3") {
        "[RSN-SAE-CCMP][ESS]".to_string()
    } else if security.contains("WPA") {
        "[WPA2-PSK-CCMP][ESS]".to_string()
    } else if security.contains("WEP") {
        "[WEP][ESS]".to_string()
    } else {
        "[ESS]".to_string()
    }
}
