//! Self-recovery: turns fatal driver failures into a full stack restart.

use serde::Serialize;
use tracing::{debug, error};

use crate::machine::{Message, MessageSender};

/// Why the wifi stack is being restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    LastResortWatchdog = 0,
    HalCrash = 1,
    WificondCrash = 2,
}

impl RecoveryReason {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryReason::LastResortWatchdog => "last_resort_watchdog",
            RecoveryReason::HalCrash => "hal_crash",
            RecoveryReason::WificondCrash => "wificond_crash",
        }
    }
}

impl TryFrom<i32> for RecoveryReason {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RecoveryReason::LastResortWatchdog),
            1 => Ok(RecoveryReason::HalCrash),
            2 => Ok(RecoveryReason::WificondCrash),
            other => Err(other),
        }
    }
}

/// Sends one restart command to the state machine per valid trigger.
#[derive(Clone)]
pub struct SelfRecovery {
    sender: MessageSender,
}

impl SelfRecovery {
    pub fn new(sender: MessageSender) -> Self {
        Self { sender }
    }

    pub fn trigger(&self, reason: RecoveryReason) {
        error!(reason = reason.name(), "triggering wifi stack restart");
        if self
            .sender
            .send(Message::RestartWifiStack { reason })
            .is_err()
        {
            debug!("state machine gone; restart dropped");
        }
    }

    /// Entry point for raw reason codes; codes outside the enum are ignored.
    pub fn trigger_raw(&self, code: i32) {
        match RecoveryReason::try_from(code) {
            Ok(reason) => self.trigger(reason),
            Err(code) => debug!(code, "ignoring invalid recovery reason"),
        }
    }
}
