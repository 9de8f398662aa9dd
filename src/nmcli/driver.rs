use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::driver::{
    FEATURE_INFRA, FEATURE_INFRA_5G, FEATURE_MOBILE_HOTSPOT, FEATURE_SCANNER, RadioDriver,
    SignalPoll,
};
use crate::error::WifiError;
use crate::machine::{AuthFailureReason, Message, MessageSender};
use crate::network::{SavedNetwork, SupplicantState};
use crate::pno::PnoNetwork;
use crate::scan::{ScanBand, ScanResult, ScanSettings, SecurityType};

use super::interface::{DeviceDetails, device_details, resolve_interface};
use super::scan::{AccessPoint, list_access_points, request_rescan};
use super::{PROFILE_PREFIX, Worker, post, profile_name, run};

/// How often the watchdog checks on NetworkManager and the interface.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);
/// Time NetworkManager gets to finish a rescan before results are read.
const SCAN_SETTLE_TIME: Duration = Duration::from_secs(3);

/// [`RadioDriver`] on top of NetworkManager.
///
/// The authentication daemon is NetworkManager's management of the
/// interface: starting it hands the interface to NetworkManager with
/// autoconnect off, stopping it takes the link down. NetworkManager
/// disappearing is reported as `VendorHalDied`, the interface disappearing
/// as `WificondDied`. WPS and PNO are not available through nmcli.
pub struct NmcliDriver {
    preferred_interface: Option<String>,
    interface: Option<String>,
    sender: MessageSender,
    worker: Worker,
    scan_cache: Arc<Mutex<Vec<ScanResult>>>,
    link: Arc<Mutex<LinkSampler>>,
    features: u32,
    watchdog: Option<CancellationToken>,
}

impl NmcliDriver {
    pub fn new(preferred_interface: Option<String>, sender: MessageSender, worker: Worker) -> Self {
        Self {
            preferred_interface,
            interface: None,
            sender,
            worker,
            scan_cache: Arc::new(Mutex::new(Vec::new())),
            link: Arc::new(Mutex::new(LinkSampler::default())),
            features: 0,
            watchdog: None,
        }
    }

    fn interface(&self) -> Result<String> {
        self.interface
            .clone()
            .ok_or_else(|| WifiError::InterfaceSetup("no interface is set up".to_string()).into())
    }

    fn claim_interface(&mut self) -> Result<DeviceDetails> {
        let iface = resolve_interface(self.preferred_interface.as_deref())?;
        run(&["device", "set", &iface.name, "managed", "yes"])
            .map_err(|e| WifiError::InterfaceSetup(e.to_string()))?;
        let details = device_details(&iface.name)?;

        self.features = features_of(&details);
        self.interface = Some(iface.name.clone());
        self.start_watchdog(&iface.name);
        Ok(details)
    }

    fn start_watchdog(&mut self, interface: &str) {
        self.stop_watchdog();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let sender = self.sender.clone();
        let interface = interface.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if !Path::new(&format!("/sys/class/net/{interface}")).exists() {
                    error!(%interface, "wifi interface vanished");
                    post(&sender, Message::WificondDied);
                    break;
                }

                let status =
                    tokio::task::spawn_blocking(|| run(&["-t", "-f", "RUNNING", "general"])).await;
                let running = matches!(&status, Ok(Ok(out)) if out.trim() == "running");
                if !running {
                    error!("NetworkManager is not running");
                    post(&sender, Message::VendorHalDied);
                    break;
                }
            }
            debug!(%interface, "watchdog stopped");
        });

        self.watchdog = Some(token);
    }

    fn stop_watchdog(&mut self) {
        if let Some(token) = self.watchdog.take() {
            token.cancel();
        }
    }
}

impl Drop for NmcliDriver {
    fn drop(&mut self) {
        self.stop_watchdog();
    }
}

impl RadioDriver for NmcliDriver {
    fn setup_client_interface(&mut self) -> Result<String> {
        let details = self.claim_interface()?;
        info!(interface = %details.interface, state = %details.state, "client interface ready");
        Ok(details.interface)
    }

    fn setup_soft_ap_interface(&mut self) -> Result<String> {
        let details = self.claim_interface()?;
        if !details.supports_ap {
            self.teardown_interfaces();
            return Err(WifiError::InterfaceSetup(format!(
                "{} cannot run an access point",
                details.interface
            ))
            .into());
        }
        info!(interface = %details.interface, "access point interface ready");
        Ok(details.interface)
    }

    fn teardown_interfaces(&mut self) {
        self.stop_watchdog();
        if let Some(interface) = self.interface.take() {
            self.worker.submit(move || {
                if let Err(e) = run(&["device", "disconnect", &interface]) {
                    debug!(%interface, error = %e, "disconnect during teardown failed");
                }
            });
        }
        lock(&self.scan_cache).clear();
        *lock(&self.link) = LinkSampler::default();
    }

    fn initialize_vendor_hal(&mut self) -> bool {
        match run(&["general", "status"]) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "NetworkManager is not reachable");
                false
            }
        }
    }

    fn enable_supplicant(&mut self) -> Result<()> {
        let interface = self.interface()?;
        let sender = self.sender.clone();
        self.worker.submit(move || {
            let started = run(&["radio", "wifi", "on"])
                .and_then(|_| run(&["device", "set", &interface, "autoconnect", "no"]));
            match started {
                Ok(_) => post(&sender, Message::SupplicantConnected),
                Err(e) => {
                    warn!(%interface, error = %e, "failed to hand interface to NetworkManager");
                    post(&sender, Message::SupplicantDisconnected);
                }
            }
        });
        Ok(())
    }

    fn disable_supplicant(&mut self) -> Result<()> {
        let interface = self.interface()?;
        let sender = self.sender.clone();
        self.worker.submit(move || {
            if let Err(e) = run(&["device", "disconnect", &interface]) {
                debug!(%interface, error = %e, "device already down");
            }
            post(&sender, Message::SupplicantDisconnected);
        });
        Ok(())
    }

    fn remove_all_networks(&mut self) -> Result<()> {
        self.worker.submit(|| {
            let profiles = match run(&["-t", "-f", "NAME", "connection", "show"]) {
                Ok(out) => out,
                Err(e) => {
                    warn!(error = %e, "failed to list connection profiles");
                    return;
                }
            };
            for name in profiles.lines().filter(|n| n.starts_with(PROFILE_PREFIX)) {
                if let Err(e) = run(&["connection", "delete", name]) {
                    debug!(profile = name, error = %e, "failed to delete profile");
                }
            }
        });
        Ok(())
    }

    fn connect_to_network(&mut self, network: &SavedNetwork) -> Result<()> {
        if network.security == SecurityType::Eap {
            bail!(WifiError::Unsupported("enterprise networks"));
        }
        let interface = self.interface()?;
        let sender = self.sender.clone();
        let network = network.clone();
        self.worker.submit(move || connect_job(&sender, &interface, &network));
        Ok(())
    }

    fn roam_to_network(&mut self, network: &SavedNetwork, bssid: &str) -> Result<()> {
        let interface = self.interface()?;
        let sender = self.sender.clone();
        let profile = profile_name(&network.ssid);
        let bssid = bssid.to_string();
        self.worker.submit(move || {
            let roamed = run(&["connection", "modify", &profile, "802-11-wireless.bssid", &bssid])
                .and_then(|_| run(&["connection", "up", &profile, "ifname", &interface]));
            match roamed {
                Ok(_) => post(&sender, Message::NetworkConnected { bssid }),
                Err(e) => {
                    warn!(%bssid, error = %e, "roam failed");
                    post(&sender, link_lost(None, false));
                }
            }
        });
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        let interface = self.interface()?;
        let sender = self.sender.clone();
        self.worker.submit(move || match run(&["device", "connect", &interface]) {
            Ok(_) => report_link_up(&sender, &interface),
            Err(e) => {
                warn!(%interface, error = %e, "reconnect failed");
                post(&sender, link_lost(None, false));
            }
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let interface = self.interface()?;
        let sender = self.sender.clone();
        self.worker.submit(move || {
            if let Err(e) = run(&["device", "disconnect", &interface]) {
                debug!(%interface, error = %e, "disconnect failed, link likely down already");
            }
            post(&sender, link_lost(None, true));
            post(
                &sender,
                Message::SupplicantStateChanged {
                    state: SupplicantState::Disconnected,
                    ssid: None,
                    bssid: None,
                },
            );
        });
        Ok(())
    }

    fn start_scan(&mut self, settings: &ScanSettings) -> Result<()> {
        let interface = self.interface()?;
        let sender = self.sender.clone();
        let cache = self.scan_cache.clone();
        let settings = settings.clone();
        self.worker.submit(move || {
            if let Err(e) = request_rescan(&interface, &settings.hidden_networks) {
                warn!(%interface, error = %e, "rescan refused");
                post(&sender, Message::ScanFailed);
                return;
            }
            thread::sleep(SCAN_SETTLE_TIME);

            match list_access_points(&interface) {
                Ok(aps) => {
                    let results: Vec<ScanResult> = aps
                        .into_iter()
                        .map(|ap| ap.scan)
                        .filter(|scan| wanted_by(&settings, scan))
                        .collect();
                    debug!(count = results.len(), "scan finished");
                    *lock(&cache) = results;
                    post(&sender, Message::ScanResultsAvailable);
                }
                Err(e) => {
                    warn!(%interface, error = %e, "failed to read scan results");
                    post(&sender, Message::ScanFailed);
                }
            }
        });
        Ok(())
    }

    fn scan_results(&mut self) -> Vec<ScanResult> {
        lock(&self.scan_cache).clone()
    }

    fn start_pno_scan(&mut self, _networks: &[PnoNetwork]) -> Result<()> {
        bail!(WifiError::Unsupported("pno scan"))
    }

    fn stop_pno_scan(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_wps_pbc(&mut self, _bssid: Option<&str>) -> Result<()> {
        bail!(WifiError::Unsupported("wps"))
    }

    fn start_wps_pin_display(&mut self, _bssid: Option<&str>) -> Result<String> {
        bail!(WifiError::Unsupported("wps"))
    }

    fn start_wps_pin_keypad(&mut self, _pin: &str) -> Result<()> {
        bail!(WifiError::Unsupported("wps"))
    }

    fn cancel_wps(&mut self) -> Result<()> {
        Ok(())
    }

    fn migrate_networks(&mut self) -> Vec<SavedNetwork> {
        Vec::new()
    }

    fn supported_features(&mut self) -> u32 {
        self.features
    }

    /// Returns the latest sample and refreshes it in the background.
    fn signal_poll(&mut self) -> Option<SignalPoll> {
        let interface = self.interface.clone()?;
        let link = self.link.clone();
        self.worker.submit(move || {
            let sample = sample_link(&interface);
            let mut sampler = lock(&link);
            match sample {
                Some((poll, counters)) => sampler.update(poll, counters, Instant::now()),
                None => sampler.sample = None,
            }
        });
        lock(&self.link).sample
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn features_of(details: &DeviceDetails) -> u32 {
    let mut features = FEATURE_INFRA | FEATURE_SCANNER;
    if details.supports_5ghz {
        features |= FEATURE_INFRA_5G;
    }
    if details.supports_ap {
        features |= FEATURE_MOBILE_HOTSPOT;
    }
    features
}

fn wanted_by(settings: &ScanSettings, scan: &ScanResult) -> bool {
    match settings.band {
        ScanBand::Unspecified => {
            settings.channels.is_empty() || settings.channels.contains(&scan.frequency)
        }
        ScanBand::TwoPointFourGhz => scan.is_24ghz(),
        ScanBand::FiveGhz => scan.is_5ghz(),
        ScanBand::Both | ScanBand::BothWithDfs => true,
    }
}

fn link_lost(bssid: Option<String>, locally_generated: bool) -> Message {
    Message::NetworkDisconnected {
        bssid,
        // IEEE 802.11 reason 3: station is leaving
        reason_code: if locally_generated { 3 } else { 0 },
        locally_generated,
    }
}

fn connect_job(sender: &MessageSender, interface: &str, network: &SavedNetwork) {
    post(
        sender,
        Message::SupplicantStateChanged {
            state: SupplicantState::Associating,
            ssid: Some(network.ssid.clone()),
            bssid: None,
        },
    );

    let profile = profile_name(&network.ssid);
    if let Err(e) = create_profile(interface, &profile, network) {
        warn!(ssid = %network.ssid, error = %e, "failed to create connection profile");
        post(sender, link_lost(None, false));
        return;
    }

    match run(&["connection", "up", &profile, "ifname", interface]) {
        Ok(_) => report_link_up(sender, interface),
        Err(e) => {
            let text = e.to_string();
            warn!(ssid = %network.ssid, error = %text, "activation failed");
            match classify_failure(&text) {
                ActivationFailure::Secrets => post(
                    sender,
                    Message::AuthenticationFailure {
                        reason: AuthFailureReason::WrongPassword,
                    },
                ),
                ActivationFailure::Timeout => post(
                    sender,
                    Message::AuthenticationFailure {
                        reason: AuthFailureReason::Timeout,
                    },
                ),
                // the link came up; provisioning will find no address
                ActivationFailure::IpConfiguration => report_link_up(sender, interface),
                ActivationFailure::Other => post(sender, link_lost(None, false)),
            }
        }
    }
}

fn create_profile(interface: &str, profile: &str, network: &SavedNetwork) -> Result<()> {
    // stale profile from an earlier attempt
    let _ = run(&["connection", "delete", profile]);

    let mut args: Vec<&str> = vec![
        "connection", "add", "type", "wifi", "ifname", interface, "con-name", profile, "ssid",
        network.ssid.as_str(), "connection.autoconnect", "no",
    ];
    match network.security {
        SecurityType::Open => {}
        SecurityType::Psk => {
            let Some(psk) = network.psk.as_deref() else {
                bail!("no passphrase saved for {}", network.ssid);
            };
            args.extend(["wifi-sec.key-mgmt", "wpa-psk", "wifi-sec.psk", psk]);
        }
        SecurityType::Wep => {
            let Some(key) = network.psk.as_deref() else {
                bail!("no WEP key saved for {}", network.ssid);
            };
            args.extend(["wifi-sec.key-mgmt", "none", "wifi-sec.wep-key0", key]);
        }
        SecurityType::Eap => bail!(WifiError::Unsupported("enterprise networks")),
    }
    if network.hidden {
        args.extend(["802-11-wireless.hidden", "yes"]);
    }

    run(&args)?;
    Ok(())
}

/// Reports the link as up with the access point NetworkManager is using.
fn report_link_up(sender: &MessageSender, interface: &str) {
    let active = list_access_points(interface)
        .ok()
        .and_then(|aps| aps.into_iter().find(|ap| ap.in_use));
    if active.is_none() {
        warn!(%interface, "active access point not in the scan list");
    }
    for message in link_up_messages(active) {
        post(sender, message);
    }
}

/// Without the access point there is no BSSID to report, so the attempt
/// is failed rather than announced with an empty one.
fn link_up_messages(active: Option<AccessPoint>) -> Vec<Message> {
    let Some(ap) = active else {
        return vec![link_lost(None, false)];
    };
    vec![
        Message::NetworkConnected {
            bssid: ap.scan.bssid.clone(),
        },
        Message::SupplicantStateChanged {
            state: SupplicantState::Completed,
            ssid: Some(ap.scan.ssid),
            bssid: Some(ap.scan.bssid),
        },
    ]
}

#[derive(Debug, PartialEq, Eq)]
enum ActivationFailure {
    Secrets,
    Timeout,
    IpConfiguration,
    Other,
}

fn classify_failure(text: &str) -> ActivationFailure {
    let text = text.to_lowercase();
    if text.contains("secrets were required") || text.contains("no secrets") {
        ActivationFailure::Secrets
    } else if text.contains("ip configuration") {
        ActivationFailure::IpConfiguration
    } else if text.contains("timeout") || text.contains("timed out") {
        ActivationFailure::Timeout
    } else {
        ActivationFailure::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PacketCounters {
    tx_packets: u64,
    tx_errors: u64,
    rx_packets: u64,
}

impl PacketCounters {
    fn read(interface: &str) -> Option<Self> {
        let stat = |name: &str| -> Option<u64> {
            fs::read_to_string(format!("/sys/class/net/{interface}/statistics/{name}"))
                .ok()?
                .trim()
                .parse()
                .ok()
        };
        Some(Self {
            tx_packets: stat("tx_packets")?,
            tx_errors: stat("tx_errors")?,
            rx_packets: stat("rx_packets")?,
        })
    }
}

#[derive(Debug, Default)]
struct LinkSampler {
    sample: Option<SignalPoll>,
    last: Option<(Instant, PacketCounters)>,
}

impl LinkSampler {
    /// Stores a fresh sample, deriving packet rates from the previous one.
    fn update(&mut self, mut poll: SignalPoll, counters: Option<PacketCounters>, now: Instant) {
        if let (Some((then, before)), Some(after)) = (self.last, counters) {
            let secs = now.duration_since(then).as_secs_f64();
            if secs > 0.0 {
                let rate = |a: u64, b: u64| a.saturating_sub(b) as f64 / secs;
                poll.tx_success_rate = rate(after.tx_packets, before.tx_packets);
                poll.tx_bad_rate = rate(after.tx_errors, before.tx_errors);
                poll.rx_success_rate = rate(after.rx_packets, before.rx_packets);
            }
        }
        self.last = counters.map(|c| (now, c));
        self.sample = Some(poll);
    }
}

fn sample_link(interface: &str) -> Option<(SignalPoll, Option<PacketCounters>)> {
    let aps = list_access_points(interface).ok()?;
    let active = aps.into_iter().find(|ap| ap.in_use)?;
    let poll = SignalPoll {
        rssi: active.scan.level,
        link_speed: active.rate as i32,
        frequency: active.scan.frequency,
        ..Default::default()
    };
    Some((poll, PacketCounters::read(interface)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_failures_are_classified() {
        assert_eq!(
            classify_failure("Error: Connection activation failed: Secrets were required, but not provided."),
            ActivationFailure::Secrets
        );
        assert_eq!(
            classify_failure("Error: Connection activation failed: IP configuration could not be reserved"),
            ActivationFailure::IpConfiguration
        );
        assert_eq!(
            classify_failure("Error: Timeout expired (90 seconds)"),
            ActivationFailure::Timeout
        );
        assert_eq!(
            classify_failure("Error: No network with SSID 'x' found."),
            ActivationFailure::Other
        );
    }

    #[test]
    fn scan_filter_follows_band_and_channels() {
        let low = ScanResult::new("a", "00:00:00:00:00:01", 2412, "[ESS]", -50);
        let high = ScanResult::new("b", "00:00:00:00:00:02", 5180, "[ESS]", -50);
        let settings = |band, channels: Vec<u32>| ScanSettings {
            band,
            channels,
            hidden_networks: Vec::new(),
            report_events: 0,
        };

        let five = settings(ScanBand::FiveGhz, vec![]);
        assert!(!wanted_by(&five, &low));
        assert!(wanted_by(&five, &high));

        let channels = settings(ScanBand::Unspecified, vec![2412]);
        assert!(wanted_by(&channels, &low));
        assert!(!wanted_by(&channels, &high));

        let all = settings(ScanBand::BothWithDfs, vec![]);
        assert!(wanted_by(&all, &low) && wanted_by(&all, &high));
    }

    #[test]
    fn packet_rates_come_from_counter_deltas() {
        let start = Instant::now();
        let mut sampler = LinkSampler::default();
        let first = PacketCounters {
            tx_packets: 100,
            tx_errors: 0,
            rx_packets: 200,
        };
        sampler.update(SignalPoll::default(), Some(first), start);
        assert_eq!(sampler.sample.unwrap().tx_success_rate, 0.0);

        let second = PacketCounters {
            tx_packets: 130,
            tx_errors: 3,
            rx_packets: 260,
        };
        sampler.update(
            SignalPoll::default(),
            Some(second),
            start + Duration::from_secs(3),
        );
        let sample = sampler.sample.unwrap();
        assert_eq!(sample.tx_success_rate, 10.0);
        assert_eq!(sample.tx_bad_rate, 1.0);
        assert_eq!(sample.rx_success_rate, 20.0);
    }

    #[test]
    fn link_up_needs_the_active_access_point() {
        let messages = link_up_messages(None);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            messages[0],
            Message::NetworkDisconnected { bssid: None, .. }
        ));

        let ap = AccessPoint {
            in_use: true,
            scan: ScanResult::new("home", "6c:f3:7f:ae:8c:f3", 2412, "[WPA2-PSK-CCMP][ESS]", -48),
            rate: 130,
        };
        let messages = link_up_messages(Some(ap));
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[0],
            Message::NetworkConnected { bssid } if bssid == "6c:f3:7f:ae:8c:f3"
        ));
        assert!(matches!(
            &messages[1],
            Message::SupplicantStateChanged {
                state: SupplicantState::Completed,
                ssid: Some(ssid),
                ..
            } if ssid == "home"
        ));
    }

    #[test]
    fn features_follow_device_properties() {
        let details = DeviceDetails {
            supports_ap: true,
            supports_5ghz: false,
            ..Default::default()
        };
        let features = features_of(&details);
        assert_ne!(features & FEATURE_MOBILE_HOTSPOT, 0);
        assert_eq!(features & FEATURE_INFRA_5G, 0);
    }
}
