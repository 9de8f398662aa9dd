use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::error::WifiError;

use super::{run, split_terse};

#[derive(Debug, Clone)]
pub struct WifiInterface {
    pub name: String,
    pub state: String,
    pub is_usb: bool,
}

/// List all WiFi interfaces NetworkManager knows about
pub fn list_wifi_interfaces() -> Result<Vec<WifiInterface>> {
    let stdout = run(&["-t", "-f", "DEVICE,TYPE,STATE", "device"])?;
    Ok(parse_device_list(&stdout))
}

fn parse_device_list(stdout: &str) -> Vec<WifiInterface> {
    stdout
        .lines()
        .map(split_terse)
        .filter(|parts| parts.len() >= 3 && parts[1] == "wifi")
        .map(|parts| WifiInterface {
            is_usb: is_usb_interface(&parts[0]),
            name: parts[0].clone(),
            state: parts[2].clone(),
        })
        .collect()
}

/// Check if a network interface is USB-based by examining sysfs
fn is_usb_interface(interface_name: &str) -> bool {
    let device_path = format!("/sys/class/net/{}/device", interface_name);
    let path = Path::new(&device_path);

    if !path.exists() {
        return false;
    }

    if let Ok(resolved) = fs::read_link(path) {
        if let Some(resolved_str) = resolved.to_str() {
            return resolved_str.contains("usb");
        }
    }

    let uevent_path = format!("{}/uevent", device_path);
    fs::read_to_string(&uevent_path)
        .map(|content| content.contains("usb"))
        .unwrap_or(false)
}

/// First WiFi interface, built-in adapters before USB ones
pub fn find_wifi_interface() -> Result<WifiInterface> {
    let mut interfaces = list_wifi_interfaces()?;
    interfaces.sort_by_key(|i| i.is_usb);

    interfaces
        .into_iter()
        .next()
        .ok_or_else(|| WifiError::NoInterfaceFound.into())
}

/// Get a specific interface by name, verifying it's a WiFi interface
pub fn get_interface(name: &str) -> Result<WifiInterface> {
    let interfaces = list_wifi_interfaces()?;

    interfaces
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| WifiError::InterfaceNotFound(name.to_string()).into())
}

/// Resolve interface: use provided name or auto-detect
pub fn resolve_interface(interface: Option<&str>) -> Result<WifiInterface> {
    match interface {
        Some(name) => get_interface(name),
        None => find_wifi_interface(),
    }
}

/// What `nmcli device show` says about one interface.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeviceDetails {
    pub interface: String,
    /// Raw state, e.g. "100 (connected)".
    pub state: String,
    /// Active connection profile, if any.
    pub connection: Option<String>,
    /// Primary IPv4 address with prefix, e.g. "192.168.4.2/24".
    pub ip_address: Option<String>,
    pub gateway: Option<String>,
    pub dns_servers: Vec<String>,
    pub lease_duration_secs: Option<u32>,
    /// Whether the adapter can run an access point.
    pub supports_ap: bool,
    pub supports_5ghz: bool,
}

pub fn device_details(interface: &str) -> Result<DeviceDetails> {
    let stdout = run(&["-t", "device", "show", interface])?;
    Ok(parse_device_details(interface, &stdout))
}

fn parse_device_details(interface: &str, stdout: &str) -> DeviceDetails {
    let mut details = DeviceDetails {
        interface: interface.to_string(),
        state: "unknown".to_string(),
        ..Default::default()
    };

    for line in stdout.lines() {
        // values may contain colons, keys never do
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let present = !value.is_empty() && value != "--";

        match key {
            "GENERAL.STATE" => details.state = value.to_string(),
            "GENERAL.CONNECTION" if present => details.connection = Some(value.to_string()),
            "IP4.ADDRESS[1]" if present => details.ip_address = Some(value.to_string()),
            "IP4.GATEWAY" if present => details.gateway = Some(value.to_string()),
            "WIFI-PROPERTIES.AP" => details.supports_ap = value == "yes",
            "WIFI-PROPERTIES.5GHZ" => details.supports_5ghz = value == "yes",
            k if k.starts_with("IP4.DNS[") && present => details.dns_servers.push(value.to_string()),
            k if k.starts_with("DHCP4.OPTION[") => {
                if let Some(lease) = value.strip_prefix("dhcp_lease_time = ") {
                    details.lease_duration_secs = lease.trim().parse().ok();
                }
            }
            _ => {}
        }
    }

    details
}

pub fn display_details(details: &DeviceDetails) {
    println!("Interface: {}", details.interface);
    println!("State:     {}", details.state);
    println!(
        "Connected: {}",
        details.connection.as_deref().unwrap_or("(none)")
    );
    if let Some(ref ip) = details.ip_address {
        println!("IP:        {}", ip);
    }
    if let Some(ref gw) = details.gateway {
        println!("Gateway:   {}", gw);
    }
}
