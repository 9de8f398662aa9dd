//! Link quality scoring for handoff decisions.
//!
//! The scorer runs on every signal poll while the link is up. Its output is
//! capped at [`WIFI_BASE_SCORE`], which sits below [`ETHERNET_BASE_SCORE`] so
//! a wired transport is never outranked by the radio.

use tracing::debug;

use crate::config::ScoringParams;
use crate::metrics::WifiMetrics;
use crate::network::WifiInfo;
use crate::scan::is_5ghz;

pub const STARTING_SCORE: i32 = 56;
pub const WIFI_BASE_SCORE: i32 = 60;
pub const ETHERNET_BASE_SCORE: i32 = 70;

/// Packets per second in both directions above which the link counts as
/// busy enough to ignore a weak signal.
pub const ACTIVITY_THRESHOLD_PPS: f64 = 5.0;

const BAD_RSSI_PENALTY: i32 = 8;
const MAX_BAD_RSSI_COUNT: i32 = 7;
const MAX_STUCK_LINK_COUNT: i32 = 5;
const LINK_SPEED_ADJUSTMENT: i32 = 4;
const GOOD_RSSI_BONUS: i32 = 5;

/// Receives the score whenever it changes.
pub trait ScoreSink: Send {
    fn report_score(&mut self, score: i32);
}

pub struct LinkQualityScorer {
    params: ScoringParams,
    sink: Option<Box<dyn ScoreSink>>,
    bad_rssi_count: i32,
    low_rssi_count: i32,
    stuck_link_count: i32,
    last_reported: Option<i32>,
}

impl LinkQualityScorer {
    pub fn new(params: ScoringParams, sink: Option<Box<dyn ScoreSink>>) -> Self {
        Self {
            params,
            sink,
            bad_rssi_count: 0,
            low_rssi_count: 0,
            stuck_link_count: 0,
            last_reported: None,
        }
    }

    /// Forgets history; called when a new link comes up.
    pub fn reset(&mut self) {
        self.bad_rssi_count = 0;
        self.low_rssi_count = 0;
        self.stuck_link_count = 0;
        self.last_reported = None;
    }

    pub fn last_score(&self) -> Option<i32> {
        self.last_reported
    }

    pub fn calculate_and_report(&mut self, info: &WifiInfo, metrics: &mut WifiMetrics) -> i32 {
        let five = is_5ghz(info.frequency);
        let busy = info.tx_success_rate > ACTIVITY_THRESHOLD_PPS
            && info.rx_success_rate > ACTIVITY_THRESHOLD_PPS;

        let mut score = STARTING_SCORE;

        if info.rssi < self.params.bad_rssi(five) {
            if !busy && self.bad_rssi_count < MAX_BAD_RSSI_COUNT {
                self.bad_rssi_count += 1;
            }
        } else if info.rssi < self.params.low_rssi(five) {
            self.low_rssi_count = 1;
            if self.bad_rssi_count > 0 {
                self.bad_rssi_count -= 1;
            }
        } else {
            self.bad_rssi_count = 0;
            self.low_rssi_count = 0;
        }
        score -= self.bad_rssi_count * BAD_RSSI_PENALTY + self.low_rssi_count;

        if info.link_speed > 0 {
            if info.link_speed < self.params.bad_link_speed(five) {
                score -= LINK_SPEED_ADJUSTMENT;
            } else if busy && info.link_speed >= self.params.good_link_speed(five) {
                score += LINK_SPEED_ADJUSTMENT;
            }
        }

        let stuck = info.tx_bad_rate >= 1.0
            && info.tx_success_rate < 3.0
            && info.tx_bad_rate > info.tx_success_rate * 0.3;
        if stuck {
            if self.stuck_link_count < MAX_STUCK_LINK_COUNT {
                self.stuck_link_count += 1;
            }
        } else if self.stuck_link_count > 0 {
            self.stuck_link_count -= 1;
        }
        if self.stuck_link_count > 1 {
            score -= (self.stuck_link_count - 1) * 2;
        }

        if info.rssi >= self.params.good_rssi(five) {
            score += GOOD_RSSI_BONUS;
        }

        let score = score.clamp(0, WIFI_BASE_SCORE);
        metrics.record_wifi_score(score);

        if self.last_reported != Some(score) {
            debug!(score, rssi = info.rssi, link_speed = info.link_speed, "wifi score changed");
            self.last_reported = Some(score);
            if let Some(sink) = self.sink.as_mut() {
                sink.report_score(score);
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<i32>>>);

    impl ScoreSink for RecordingSink {
        fn report_score(&mut self, score: i32) {
            self.0.lock().unwrap().push(score);
        }
    }

    fn info(rssi: i32, frequency: u32, link_speed: i32, tx: f64, rx: f64) -> WifiInfo {
        WifiInfo {
            rssi,
            frequency,
            link_speed,
            tx_success_rate: tx,
            rx_success_rate: rx,
            ..WifiInfo::default()
        }
    }

    #[test]
    fn strong_busy_link_hits_the_ceiling() {
        let mut scorer = LinkQualityScorer::new(ScoringParams::default(), None);
        let mut metrics = WifiMetrics::new();
        let score = scorer.calculate_and_report(&info(-45, 5180, 400, 20.0, 20.0), &mut metrics);
        assert_eq!(score, WIFI_BASE_SCORE);
        assert!(score < ETHERNET_BASE_SCORE);
    }

    #[test]
    fn bad_signal_decays_toward_zero_when_idle() {
        let mut scorer = LinkQualityScorer::new(ScoringParams::default(), None);
        let mut metrics = WifiMetrics::new();
        let weak = info(-90, 2412, 1, 0.0, 0.0);

        let mut previous = WIFI_BASE_SCORE;
        for _ in 0..7 {
            let score = scorer.calculate_and_report(&weak, &mut metrics);
            assert!(score < previous);
            previous = score;
        }
        assert_eq!(scorer.calculate_and_report(&weak, &mut metrics), 0);
    }

    #[test]
    fn traffic_suppresses_decay_on_bad_signal() {
        let mut scorer = LinkQualityScorer::new(ScoringParams::default(), None);
        let mut metrics = WifiMetrics::new();
        let weak_busy = info(-90, 2412, 54, 10.0, 10.0);

        let first = scorer.calculate_and_report(&weak_busy, &mut metrics);
        for _ in 0..5 {
            assert_eq!(scorer.calculate_and_report(&weak_busy, &mut metrics), first);
        }
        assert_eq!(first, STARTING_SCORE + LINK_SPEED_ADJUSTMENT);
    }

    #[test]
    fn works_without_a_sink_and_counts_every_call() {
        let mut scorer = LinkQualityScorer::new(ScoringParams::default(), None);
        let mut metrics = WifiMetrics::new();
        for _ in 0..3 {
            scorer.calculate_and_report(&info(-65, 2412, 54, 0.0, 0.0), &mut metrics);
        }
        assert_eq!(metrics.num_wifi_score_reports, 3);
    }

    #[test]
    fn sink_sees_only_changes() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink(reports.clone());
        let mut scorer = LinkQualityScorer::new(ScoringParams::default(), Some(Box::new(sink)));
        let mut metrics = WifiMetrics::new();

        let good = info(-50, 5180, 200, 0.0, 0.0);
        scorer.calculate_and_report(&good, &mut metrics);
        scorer.calculate_and_report(&good, &mut metrics);
        scorer.calculate_and_report(&info(-88, 5180, 200, 0.0, 0.0), &mut metrics);

        assert_eq!(*reports.lock().unwrap(), vec![WIFI_BASE_SCORE, 48]);
        assert_eq!(metrics.num_wifi_score_reports, 3);
    }

    #[test]
    fn slow_link_costs_points() {
        let mut scorer = LinkQualityScorer::new(ScoringParams::default(), None);
        let mut metrics = WifiMetrics::new();
        let score = scorer.calculate_and_report(&info(-65, 2412, 2, 0.0, 0.0), &mut metrics);
        assert_eq!(score, STARTING_SCORE - LINK_SPEED_ADJUSTMENT);
    }
}
