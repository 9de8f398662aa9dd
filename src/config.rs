use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::network::SavedNetwork;
use crate::scan::SecurityType;

/// Port of the HTTP control API when none is configured.
pub const DEFAULT_API_PORT: u16 = 7878;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub default_interface: Option<String>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub ssid: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Inferred from `password` when absent.
    #[serde(default)]
    pub security: Option<SecurityType>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_true")]
    pub trusted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub verbose_logging: bool,
    pub untrusted_networks_allowed: bool,
    /// Hides the ranging feature bits from the supported feature set.
    pub disable_rtt: bool,
    pub api_port: u16,
    pub soft_ap: SoftApConfig,
    pub scoring: ScoringParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verbose_logging: false,
            untrusted_networks_allowed: false,
            disable_rtt: false,
            api_port: DEFAULT_API_PORT,
            soft_ap: SoftApConfig::default(),
            scoring: ScoringParams::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApBand {
    #[default]
    TwoPointFourGhz,
    FiveGhz,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SoftApConfig {
    pub ssid: String,
    pub passphrase: Option<String>,
    pub band: ApBand,
}

impl Default for SoftApConfig {
    fn default() -> Self {
        Self {
            ssid: "wifi-manager-ap".to_string(),
            passphrase: None,
            band: ApBand::TwoPointFourGhz,
        }
    }
}

/// Signal and link speed thresholds plus the saved network score weights.
///
/// The bad RSSI thresholds double as the minimum level a scan result needs
/// to be considered at all, the low thresholds as the level a current
/// network must hold to be kept, and the good thresholds as the level where
/// the saved network score saturates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScoringParams {
    pub bad_rssi_24ghz: i32,
    pub low_rssi_24ghz: i32,
    pub good_rssi_24ghz: i32,
    pub bad_rssi_5ghz: i32,
    pub low_rssi_5ghz: i32,
    pub good_rssi_5ghz: i32,

    pub bad_link_speed_24ghz: i32,
    pub good_link_speed_24ghz: i32,
    pub bad_link_speed_5ghz: i32,
    pub good_link_speed_5ghz: i32,

    pub rssi_score_offset: i32,
    pub rssi_score_slope: i32,
    pub band_5ghz_award: i32,
    pub last_selection_award: i32,
    pub current_network_boost: i32,
    pub same_bssid_award: i32,
    pub security_award: i32,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            bad_rssi_24ghz: -85,
            low_rssi_24ghz: -73,
            good_rssi_24ghz: -60,
            bad_rssi_5ghz: -82,
            low_rssi_5ghz: -70,
            good_rssi_5ghz: -57,

            bad_link_speed_24ghz: 6,
            good_link_speed_24ghz: 24,
            bad_link_speed_5ghz: 12,
            good_link_speed_5ghz: 36,

            rssi_score_offset: 85,
            rssi_score_slope: 4,
            band_5ghz_award: 40,
            last_selection_award: 480,
            current_network_boost: 16,
            same_bssid_award: 24,
            security_award: 80,
        }
    }
}

impl ScoringParams {
    pub fn bad_rssi(&self, is_5ghz: bool) -> i32 {
        if is_5ghz { self.bad_rssi_5ghz } else { self.bad_rssi_24ghz }
    }

    pub fn low_rssi(&self, is_5ghz: bool) -> i32 {
        if is_5ghz { self.low_rssi_5ghz } else { self.low_rssi_24ghz }
    }

    pub fn good_rssi(&self, is_5ghz: bool) -> i32 {
        if is_5ghz { self.good_rssi_5ghz } else { self.good_rssi_24ghz }
    }

    pub fn bad_link_speed(&self, is_5ghz: bool) -> i32 {
        if is_5ghz { self.bad_link_speed_5ghz } else { self.bad_link_speed_24ghz }
    }

    pub fn good_link_speed(&self, is_5ghz: bool) -> i32 {
        if is_5ghz { self.good_link_speed_5ghz } else { self.good_link_speed_24ghz }
    }
}

fn default_true() -> bool {
    true
}

impl NetworkConfig {
    pub fn security(&self) -> SecurityType {
        self.security.unwrap_or(match self.password {
            Some(_) => SecurityType::Psk,
            None => SecurityType::Open,
        })
    }

    pub fn to_saved_network(&self) -> SavedNetwork {
        let mut network = SavedNetwork::new(&self.ssid, self.security()).with_hidden(self.hidden);
        network.psk = self.password.clone();
        network.trusted = self.trusted;
        network
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn find_network(&self, ssid: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.ssid == ssid)
    }

    pub fn add_network(&mut self, network: NetworkConfig) {
        // Same SSID replaces the older entry
        self.networks.retain(|n| n.ssid != network.ssid);
        self.networks.push(network);
    }

    pub fn remove_network(&mut self, ssid: &str) -> bool {
        let before = self.networks.len();
        self.networks.retain(|n| n.ssid != ssid);
        self.networks.len() != before
    }

    pub fn saved_networks(&self) -> Vec<SavedNetwork> {
        self.networks.iter().map(NetworkConfig::to_saved_network).collect()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?;
    Ok(config_dir.join("wifi-manager").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg = Config::parse(
            r#"
            [[networks]]
            ssid = "home"
            password = "hunter22"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.settings.api_port, DEFAULT_API_PORT);
        assert_eq!(cfg.settings.scoring, ScoringParams::default());
        let network = &cfg.networks[0];
        assert_eq!(network.security(), SecurityType::Psk);
        assert!(network.trusted);
    }

    #[test]
    fn partial_scoring_overrides_keep_other_defaults() {
        let cfg = Config::parse(
            r#"
            [settings]
            disable_rtt = true

            [settings.scoring]
            bad_rssi_5ghz = -80
            "#,
        )
        .unwrap();

        assert!(cfg.settings.disable_rtt);
        assert_eq!(cfg.settings.scoring.bad_rssi_5ghz, -80);
        assert_eq!(cfg.settings.scoring.bad_rssi_24ghz, -85);
    }

    #[test]
    fn open_networks_have_no_password() {
        let network = NetworkConfig {
            ssid: "cafe".into(),
            password: None,
            security: None,
            hidden: true,
            trusted: true,
        };
        let saved = network.to_saved_network();
        assert_eq!(saved.security, SecurityType::Open);
        assert!(saved.hidden);
        assert!(saved.psk.is_none());
    }

    #[test]
    fn add_network_replaces_same_ssid() {
        let mut cfg = Config::default();
        let mut network = NetworkConfig {
            ssid: "home".into(),
            password: Some("one".into()),
            security: None,
            hidden: false,
            trusted: true,
        };
        cfg.add_network(network.clone());
        network.password = Some("two".into());
        cfg.add_network(network);

        assert_eq!(cfg.networks.len(), 1);
        assert_eq!(cfg.find_network("home").unwrap().password.as_deref(), Some("two"));
        assert!(cfg.remove_network("home"));
        assert!(!cfg.remove_network("home"));
    }
}
