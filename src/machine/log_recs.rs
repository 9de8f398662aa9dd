use std::collections::VecDeque;

use serde::Serialize;

pub const NUM_LOG_RECS_NORMAL: usize = 100;
pub const NUM_LOG_RECS_VERBOSE: usize = 3000;

/// Message names left out of the ring unless verbose logging is on.
const HIGH_FREQUENCY_MESSAGES: &[&str] = &["RssiPoll"];

/// A processed message, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRec {
    pub what: &'static str,
    pub state: &'static str,
    pub at_millis: u64,
}

#[derive(Debug)]
pub struct LogRecs {
    recs: VecDeque<LogRec>,
    capacity: usize,
    verbose: bool,
}

impl Default for LogRecs {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRecs {
    pub fn new() -> Self {
        Self {
            recs: VecDeque::new(),
            capacity: NUM_LOG_RECS_NORMAL,
            verbose: false,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
        if verbose {
            self.capacity = NUM_LOG_RECS_VERBOSE;
        } else {
            self.capacity = NUM_LOG_RECS_NORMAL;
            self.recs.clear();
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&mut self, what: &'static str, state: &'static str, at_millis: u64) {
        if !self.verbose && HIGH_FREQUENCY_MESSAGES.contains(&what) {
            return;
        }
        while self.recs.len() >= self.capacity {
            self.recs.pop_front();
        }
        self.recs.push_back(LogRec {
            what,
            state,
            at_millis,
        });
    }

    pub fn len(&self) -> usize {
        self.recs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recs.is_empty()
    }

    pub fn snapshot(&self) -> Vec<LogRec> {
        self.recs.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_bounded() {
        let mut recs = LogRecs::new();
        for i in 0..(NUM_LOG_RECS_NORMAL as u64 + 5) {
            recs.record("Reconnect", "DisconnectedState", i);
        }
        assert_eq!(recs.len(), NUM_LOG_RECS_NORMAL);
        assert_eq!(recs.snapshot()[0].at_millis, 5);
    }

    #[test]
    fn rssi_poll_only_recorded_when_verbose() {
        let mut recs = LogRecs::new();
        recs.record("RssiPoll", "ConnectedState", 0);
        assert!(recs.is_empty());

        recs.set_verbose(true);
        recs.record("RssiPoll", "ConnectedState", 1);
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn leaving_verbose_clears_and_shrinks() {
        let mut recs = LogRecs::new();
        recs.set_verbose(true);
        assert_eq!(recs.capacity(), NUM_LOG_RECS_VERBOSE);
        for i in 0..200 {
            recs.record("StartScan", "ConnectModeState", i);
        }
        assert_eq!(recs.len(), 200);

        recs.set_verbose(false);
        assert!(recs.is_empty());
        assert_eq!(recs.capacity(), NUM_LOG_RECS_NORMAL);
    }
}
