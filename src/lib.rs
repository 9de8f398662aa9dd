//! WiFi connection manager.
//!
//! Owns one radio and decides, at any moment, whether it is off, scanning,
//! connected to an access point, or running one. The pieces:
//!
//! - [`machine`] - the hierarchical connection state machine that drives the radio
//! - [`selector`] - picks the network to join from a scan, honouring user choices
//! - [`score`] - turns link samples into a link quality score
//! - [`recovery`] - restarts the whole stack after a driver or daemon crash
//! - [`controller`] - async handle that feeds the machine from a tokio task
//! - [`nmcli`] - NetworkManager implementations of the driver interfaces
//! - [`server`] - HTTP control API over the controller
//!
//! # Example Usage
//!
//! ```no_run
//! use wifi_manager::nmcli::{find_wifi_interface, scan_networks};
//!
//! let iface = find_wifi_interface().expect("No WiFi interface");
//! for result in scan_networks(&iface.name).expect("Scan failed") {
//!     println!("{} {} dBm", result.ssid, result.level);
//! }
//! ```

pub mod blacklist;
pub mod clock;

/// Configuration file: saved networks, thresholds and daemon settings.
pub mod config;

pub mod controller;
pub mod driver;

/// Error types shared across the crate.
pub mod error;

pub mod machine;
pub mod metrics;
pub mod network;
pub mod nmcli;
pub mod notify;
pub mod pno;
pub mod recovery;
pub mod scan;
pub mod score;
pub mod selector;
pub mod server;
pub mod store;

pub use controller::WifiController;
pub use error::WifiError;
pub use machine::{Message, State, StateMachine};
pub use network::{RadioMode, SavedNetwork, WifiInfo};
pub use scan::ScanResult;
pub use selector::WifiNetworkSelector;
