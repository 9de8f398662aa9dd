//! BSSIDs that keep failing to authenticate are kept out of selection for a
//! while.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::info;

pub const BSSID_BLACKLIST_THRESHOLD: u32 = 3;
pub const BSSID_BLACKLIST_EXPIRE_TIME: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Default)]
struct BssidStatus {
    failures: u32,
    blacklisted_at: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct BssidBlacklist {
    entries: HashMap<String, BssidStatus>,
}

impl BssidBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a failure; returns true when this failure blacklists the BSSID.
    pub fn record_failure(&mut self, bssid: &str, now: Duration) -> bool {
        let status = self.entries.entry(bssid.to_string()).or_default();
        status.failures += 1;
        if status.blacklisted_at.is_none() && status.failures >= BSSID_BLACKLIST_THRESHOLD {
            status.blacklisted_at = Some(now);
            info!(bssid, failures = status.failures, "bssid blacklisted");
            return true;
        }
        false
    }

    pub fn is_blacklisted(&self, bssid: &str, now: Duration) -> bool {
        self.entries
            .get(bssid)
            .and_then(|s| s.blacklisted_at)
            .is_some_and(|at| now.saturating_sub(at) < BSSID_BLACKLIST_EXPIRE_TIME)
    }

    /// Forgets a BSSID, e.g. after a successful connection.
    pub fn clear(&mut self, bssid: &str) {
        self.entries.remove(bssid);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Currently blacklisted BSSIDs; expired entries are dropped.
    pub fn blacklisted(&mut self, now: Duration) -> HashSet<String> {
        self.entries.retain(|_, s| match s.blacklisted_at {
            Some(at) => now.saturating_sub(at) < BSSID_BLACKLIST_EXPIRE_TIME,
            None => true,
        });
        self.entries
            .iter()
            .filter(|(_, s)| s.blacklisted_at.is_some())
            .map(|(bssid, _)| bssid.clone())
            .collect()
    }
}
