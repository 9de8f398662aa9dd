use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::config::{ApBand, SoftApConfig};
use crate::driver::SoftApManager;
use crate::machine::{Message, MessageSender};
use crate::network::RadioMode;
use crate::notify::{ApFailure, ApState};

use super::{Worker, post, profile_name, run};

const MIN_PASSPHRASE_LEN: usize = 8;

/// Runs an access point with `nmcli device wifi hotspot`.
pub struct NmcliSoftAp {
    worker: Worker,
    sender: MessageSender,
}

impl NmcliSoftAp {
    pub fn new(sender: MessageSender, worker: Worker) -> Self {
        Self { worker, sender }
    }
}

fn hotspot_profile() -> String {
    profile_name("hotspot")
}

fn hotspot_args(interface: &str, profile: &str, config: &SoftApConfig) -> Vec<String> {
    let band = match config.band {
        ApBand::TwoPointFourGhz => "bg",
        ApBand::FiveGhz => "a",
    };
    let mut args: Vec<String> = [
        "device", "wifi", "hotspot", "ifname", interface, "con-name", profile, "ssid",
        config.ssid.as_str(), "band", band,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if let Some(passphrase) = &config.passphrase {
        args.push("password".to_string());
        args.push(passphrase.clone());
    }
    args
}

fn state_changed(state: ApState, failure: Option<ApFailure>) -> Message {
    Message::SoftApStateChanged { state, failure }
}

impl SoftApManager for NmcliSoftAp {
    fn start(&mut self, interface: &str, config: &SoftApConfig, mode: RadioMode) -> Result<()> {
        if config.ssid.is_empty() {
            bail!("access point needs an SSID");
        }
        if let Some(passphrase) = &config.passphrase {
            if passphrase.len() < MIN_PASSPHRASE_LEN {
                bail!("access point passphrase must be at least {MIN_PASSPHRASE_LEN} characters");
            }
        }

        post(&self.sender, state_changed(ApState::Enabling, None));

        let args = hotspot_args(interface, &hotspot_profile(), config);
        let sender = self.sender.clone();
        let ssid = config.ssid.clone();
        self.worker.submit(move || {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match run(&args) {
                Ok(_) => {
                    info!(%ssid, ?mode, "access point up");
                    post(&sender, state_changed(ApState::Enabled, None));
                }
                Err(e) => {
                    let text = e.to_string();
                    warn!(%ssid, error = %text, "access point failed to start");
                    let failure = if text.to_lowercase().contains("channel") {
                        ApFailure::NoChannel
                    } else {
                        ApFailure::General
                    };
                    post(&sender, state_changed(ApState::Failed, Some(failure)));
                }
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        post(&self.sender, state_changed(ApState::Disabling, None));
        let sender = self.sender.clone();
        self.worker.submit(move || {
            let profile = hotspot_profile();
            // already gone when the start failed
            let _ = run(&["connection", "down", &profile]);
            let _ = run(&["connection", "delete", &profile]);
            post(&sender, state_changed(ApState::Disabled, None));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotspot_command_line() {
        let config = SoftApConfig {
            ssid: "lab".to_string(),
            passphrase: Some("secret123".to_string()),
            band: ApBand::FiveGhz,
        };
        let args = hotspot_args("wlan1", "wifi-mgr-hotspot", &config);
        assert_eq!(
            args,
            vec![
                "device", "wifi", "hotspot", "ifname", "wlan1", "con-name", "wifi-mgr-hotspot",
                "ssid", "lab", "band", "a", "password", "secret123"
            ]
        );
    }

    #[test]
    fn open_hotspot_has_no_password() {
        let args = hotspot_args("wlan1", "p", &SoftApConfig::default());
        assert!(!args.iter().any(|a| a == "password"));
        assert!(args.iter().any(|a| a == "bg"));
    }
}
