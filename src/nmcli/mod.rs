//! NetworkManager backend.
//!
//! Implements the driver, IP provisioning and soft AP interfaces by running
//! `nmcli`. Anything that can take a while runs on a single background
//! worker, one job at a time, and reports back by posting messages onto the
//! state machine's queue.
//!
//! # Requirements
//!
//! - NetworkManager must be installed and running
//! - The `nmcli` command must be available in PATH
//! - The user must be allowed to manage network connections

mod driver;
mod hotspot;
mod interface;
mod ip;
mod scan;

pub use driver::NmcliDriver;
pub use hotspot::NmcliSoftAp;
pub use interface::{
    DeviceDetails, WifiInterface, device_details, display_details, find_wifi_interface,
    get_interface, list_wifi_interfaces, resolve_interface,
};
pub use ip::NmcliIpClient;
pub use scan::scan_networks;

use std::process::Command;
use std::sync::mpsc;

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::error::WifiError;
use crate::machine::{Message, MessageSender};

/// Prefix of every connection profile this crate creates.
pub const PROFILE_PREFIX: &str = "wifi-mgr-";

/// Runs `nmcli` with `args` and returns its stdout.
pub(crate) fn run(args: &[&str]) -> Result<String> {
    trace!(?args, "nmcli");
    let output = Command::new("nmcli")
        .args(args)
        .output()
        .context("Failed to execute nmcli")?;

    if !output.status.success() {
        // nmcli reports most failures on stderr, a few on stdout
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(WifiError::NmcliExecution(message).into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Splits one line of terse (`-t`) output into fields. Colons inside values
/// are escaped as `\:` and backslashes as `\\`.
pub(crate) fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// nmcli reports signal as a 0-100 quality; dBm is recovered from it the
/// same way NetworkManager derives the quality.
pub(crate) fn signal_to_dbm(quality: u8) -> i32 {
    i32::from(quality.min(100)) / 2 - 100
}

/// Parses the leading number of values like `5180 MHz` or `54 Mbit/s`.
pub(crate) fn leading_number(value: &str) -> Option<u32> {
    value.split_whitespace().next()?.parse().ok()
}

pub(crate) fn profile_name(ssid: &str) -> String {
    format!("{PROFILE_PREFIX}{ssid}")
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs one after another on a blocking thread.
#[derive(Clone)]
pub struct Worker {
    jobs: mpsc::Sender<Job>,
}

impl Worker {
    /// Starts the worker. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (jobs, queue) = mpsc::channel::<Job>();
        tokio::task::spawn_blocking(move || {
            for job in queue {
                job();
            }
            debug!("nmcli worker stopped");
        });
        Self { jobs }
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if self.jobs.send(Box::new(job)).is_err() {
            debug!("nmcli worker gone, dropping job");
        }
    }
}

/// Posts a message to the state machine; a closed queue means the manager
/// is shutting down.
pub(crate) fn post(sender: &MessageSender, message: Message) {
    if sender.send(message).is_err() {
        debug!("state machine gone, dropping event");
    }
}
