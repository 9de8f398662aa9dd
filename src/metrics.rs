//! Counters and connection events kept by the state machine.
//!
//! The machine owns a single [`WifiMetrics`] and mutates it from its own
//! task; everyone else sees clones handed out through `GetMetrics`.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::debug;

use crate::recovery::RecoveryReason;

/// Oldest connection events are dropped past this many.
pub const MAX_CONNECTION_EVENTS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamType {
    None,
    Roam,
    UserSelected,
    Unrelated,
}

/// Why a connection attempt did not end in an IP-configured link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailure {
    AuthenticationFailure,
    AssociationRejection,
    DhcpFailure,
    NetworkDisconnection,
    NewConnectionAttempt,
    RedundantConnectionAttempt,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionEvent {
    pub start_millis: u64,
    pub ssid: String,
    pub bssid: Option<String>,
    pub roam_type: RoamType,
    /// `None` while open and for successful attempts.
    pub failure: Option<ConnectionFailure>,
    /// Set once the event is closed.
    pub duration_millis: Option<u64>,
}

impl ConnectionEvent {
    pub fn succeeded(&self) -> bool {
        self.duration_millis.is_some() && self.failure.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WifiMetrics {
    pub num_hal_crashes: u32,
    pub num_wificond_crashes: u32,
    pub num_supplicant_crashes: u32,
    pub num_setup_client_interface_failures: u32,
    pub num_setup_soft_ap_interface_failures: u32,
    pub num_supplicant_start_failures: u32,
    pub num_scans: u32,
    pub num_scan_failures: u32,
    pub num_authentication_failures: u32,
    pub num_dhcp_failures: u32,
    pub num_wifi_score_reports: u32,
    /// Score value to number of reports with that value.
    pub wifi_score_histogram: BTreeMap<i32, u32>,
    pub self_recoveries: BTreeMap<String, u32>,
    pub connection_events: VecDeque<ConnectionEvent>,
    #[serde(skip)]
    current_event: Option<usize>,
}

impl WifiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection event. A still open event is closed first as
    /// superseded.
    pub fn start_connection_event(
        &mut self,
        ssid: &str,
        bssid: Option<&str>,
        roam_type: RoamType,
        now_millis: u64,
    ) {
        if let Some(open) = self.current_event() {
            let failure = if open.ssid == ssid {
                ConnectionFailure::RedundantConnectionAttempt
            } else {
                ConnectionFailure::NewConnectionAttempt
            };
            self.end_connection_event(Some(failure), now_millis);
        }

        if self.connection_events.len() == MAX_CONNECTION_EVENTS {
            self.connection_events.pop_front();
        }
        self.connection_events.push_back(ConnectionEvent {
            start_millis: now_millis,
            ssid: ssid.to_string(),
            bssid: bssid.map(str::to_string),
            roam_type,
            failure: None,
            duration_millis: None,
        });
        self.current_event = Some(self.connection_events.len() - 1);
    }

    /// Closes the open connection event; a no-op when none is open.
    pub fn end_connection_event(&mut self, failure: Option<ConnectionFailure>, now_millis: u64) {
        let Some(index) = self.current_event.take() else {
            return;
        };
        if let Some(event) = self.connection_events.get_mut(index) {
            event.failure = failure;
            event.duration_millis = Some(now_millis.saturating_sub(event.start_millis));
            debug!(ssid = %event.ssid, ?failure, "connection event closed");
        }
    }

    pub fn current_event(&self) -> Option<&ConnectionEvent> {
        self.current_event.and_then(|i| self.connection_events.get(i))
    }

    /// Sets the BSSID of the open connection event once it is known.
    pub fn set_current_event_bssid(&mut self, bssid: &str) {
        if let Some(index) = self.current_event {
            if let Some(event) = self.connection_events.get_mut(index) {
                event.bssid = Some(bssid.to_string());
            }
        }
    }

    pub fn record_wifi_score(&mut self, score: i32) {
        self.num_wifi_score_reports += 1;
        *self.wifi_score_histogram.entry(score).or_default() += 1;
    }

    pub fn record_self_recovery(&mut self, reason: RecoveryReason) {
        *self
            .self_recoveries
            .entry(reason.name().to_string())
            .or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_a_new_event_closes_the_open_one() {
        let mut metrics = WifiMetrics::new();
        metrics.start_connection_event("a", None, RoamType::UserSelected, 100);
        metrics.start_connection_event("b", None, RoamType::UserSelected, 250);

        assert_eq!(metrics.connection_events.len(), 2);
        let first = &metrics.connection_events[0];
        assert_eq!(first.failure, Some(ConnectionFailure::NewConnectionAttempt));
        assert_eq!(first.duration_millis, Some(150));
        assert_eq!(metrics.current_event().unwrap().ssid, "b");
    }

    #[test]
    fn restarting_the_same_network_is_redundant() {
        let mut metrics = WifiMetrics::new();
        metrics.start_connection_event("a", None, RoamType::Unrelated, 0);
        metrics.start_connection_event("a", None, RoamType::UserSelected, 10);
        assert_eq!(
            metrics.connection_events[0].failure,
            Some(ConnectionFailure::RedundantConnectionAttempt)
        );
    }

    #[test]
    fn ending_without_an_open_event_is_a_no_op() {
        let mut metrics = WifiMetrics::new();
        metrics.end_connection_event(Some(ConnectionFailure::DhcpFailure), 5);
        assert!(metrics.connection_events.is_empty());

        metrics.start_connection_event("a", Some("aa:bb:cc:dd:ee:ff"), RoamType::None, 0);
        metrics.end_connection_event(None, 40);
        metrics.end_connection_event(Some(ConnectionFailure::DhcpFailure), 80);
        assert!(metrics.connection_events[0].succeeded());
    }

    #[test]
    fn event_log_is_bounded() {
        let mut metrics = WifiMetrics::new();
        for i in 0..(MAX_CONNECTION_EVENTS as u64 + 10) {
            metrics.start_connection_event(&format!("n{}", i), None, RoamType::None, i);
        }
        assert_eq!(metrics.connection_events.len(), MAX_CONNECTION_EVENTS);
        assert_eq!(metrics.connection_events.front().unwrap().ssid, "n10");
        assert!(metrics.current_event().is_some());
    }

    #[test]
    fn score_histogram_counts_every_report() {
        let mut metrics = WifiMetrics::new();
        metrics.record_wifi_score(60);
        metrics.record_wifi_score(60);
        metrics.record_wifi_score(48);
        assert_eq!(metrics.num_wifi_score_reports, 3);
        assert_eq!(metrics.wifi_score_histogram[&60], 2);
    }
}
