//! The connection state machine.
//!
//! A single [`StateMachine`] owns the radio: its mode, the current link, the
//! scan cache, the counters and the log ring. It is driven one [`Message`]
//! at a time by whoever owns the receiving end of its queue (see
//! [`WifiController`](crate::controller::WifiController)). Handlers never
//! block; anything slow is requested from a collaborator whose outcome
//! comes back as another message.
//!
//! States form a tree (see [`State::parent`]). A message is offered to the
//! current state first and walks up the tree until some state handles it.
//! Transitions requested while handling a message run once the handler
//! returns: exit actions up to the common ancestor, then entry actions down
//! to the target. Deferred messages are replayed, in order, right after the
//! next transition.

mod handlers;
mod log_recs;
mod message;
mod state;


pub use log_recs::{LogRec, LogRecs, NUM_LOG_RECS_NORMAL, NUM_LOG_RECS_VERBOSE};
pub use message::{
    ActionFailure, ActionResult, AuthFailureReason, Message, MessageReceiver, MessageSender,
    RadioStatus, Reply, WpsFailure, WpsInfo, WpsResult, WpsSetup,
};
pub use state::State;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::blacklist::BssidBlacklist;
use crate::clock::Clock;
use crate::config::{Settings, SoftApConfig};
use crate::driver::{DhcpResults, IpClient, RadioDriver, SoftApManager};
use crate::metrics::WifiMetrics;
use crate::network::{NetworkId, RadioMode, WifiInfo};
use crate::notify::{ApFailure, ApState, Notification, Notifier, WifiState};
use crate::recovery::SelfRecovery;
use crate::score::{LinkQualityScorer, ScoreSink};
use crate::selector::{SavedNetworkEvaluator, WifiNetworkSelector};
use crate::store::ConfigStore;

/// Interval between signal polls while the link is up.
pub const RSSI_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// How long to wait for the link to drop after asking for a disconnect.
pub const DISCONNECTING_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);
/// Delay before restarting the daemon after it died on its own.
pub const SUPPLICANT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Delivers a message back to the machine after a delay.
pub trait Scheduler: Send {
    fn schedule(&mut self, delay: Duration, message: Message);
}

/// [`Scheduler`] backed by tokio timers.
pub struct TokioScheduler {
    sender: MessageSender,
}

impl TokioScheduler {
    pub fn new(sender: MessageSender) -> Self {
        Self { sender }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, message: Message) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // machine gone means nobody cares about the timer
            let _ = sender.send(message);
        });
    }
}

/// What a state did with a message.
pub(crate) enum Flow {
    Handled,
    NotHandled(Message),
}

/// Collaborators the machine drives.
pub struct Collaborators {
    pub driver: Box<dyn RadioDriver>,
    pub ip_client: Box<dyn IpClient>,
    pub soft_ap: Box<dyn SoftApManager>,
    pub notifier: Box<dyn Notifier>,
    pub store: Box<dyn ConfigStore>,
    pub scheduler: Box<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
    pub score_sink: Option<Box<dyn ScoreSink>>,
}

pub struct StateMachine {
    state: State,
    pending_transition: Option<State>,
    transitioned: bool,
    deferred: VecDeque<Message>,

    sender: MessageSender,
    driver: Box<dyn RadioDriver>,
    ip_client: Box<dyn IpClient>,
    soft_ap: Box<dyn SoftApManager>,
    notifier: Box<dyn Notifier>,
    store: Box<dyn ConfigStore>,
    scheduler: Box<dyn Scheduler>,
    clock: Arc<dyn Clock>,

    selector: WifiNetworkSelector,
    scorer: LinkQualityScorer,
    recovery: SelfRecovery,
    blacklist: BssidBlacklist,
    metrics: WifiMetrics,
    log_recs: LogRecs,

    disable_rtt: bool,
    untrusted_networks_allowed: bool,
    soft_ap_config: SoftApConfig,

    mode: RadioMode,
    wifi_state: WifiState,
    ap_state: ApState,
    interface: Option<String>,
    wifi_info: WifiInfo,
    dhcp_results: Option<DhcpResults>,
    scan_results: Vec<crate::scan::ScanResult>,
    target_network_id: Option<NetworkId>,
    link_pending: bool,
    pno_running: bool,
    wps_running: bool,
    rssi_poll_token: u64,
    disconnecting_token: u64,
}

impl StateMachine {
    pub fn new(collaborators: Collaborators, settings: &Settings, sender: MessageSender) -> Self {
        let Collaborators {
            driver,
            ip_client,
            soft_ap,
            notifier,
            store,
            scheduler,
            clock,
            score_sink,
        } = collaborators;

        let mut selector = WifiNetworkSelector::new(settings.scoring.clone(), clock.clone());
        selector.register_evaluator(
            Box::new(SavedNetworkEvaluator::new(settings.scoring.clone())),
            1,
        );

        let mut log_recs = LogRecs::new();
        log_recs.set_verbose(settings.verbose_logging);

        Self {
            state: State::Default,
            pending_transition: None,
            transitioned: false,
            deferred: VecDeque::new(),

            recovery: SelfRecovery::new(sender.clone()),
            sender,
            driver,
            ip_client,
            soft_ap,
            notifier,
            store,
            scheduler,
            clock,

            selector,
            scorer: LinkQualityScorer::new(settings.scoring.clone(), score_sink),
            blacklist: BssidBlacklist::new(),
            metrics: WifiMetrics::new(),
            log_recs,

            disable_rtt: settings.disable_rtt,
            untrusted_networks_allowed: settings.untrusted_networks_allowed,
            soft_ap_config: settings.soft_ap.clone(),

            mode: RadioMode::Disabled,
            wifi_state: WifiState::Disabled,
            ap_state: ApState::Disabled,
            interface: None,
            wifi_info: WifiInfo::default(),
            dhcp_results: None,
            scan_results: Vec::new(),
            target_network_id: None,
            link_pending: false,
            pno_running: false,
            wps_running: false,
            rssi_poll_token: 0,
            disconnecting_token: 0,
        }
    }

    /// Enters the initial state. Call once before handling messages.
    pub fn start(&mut self) {
        self.state = State::Default;
        self.enter(State::Default);
        self.transition_to(State::Initial);
        self.run_transitions();
        self.transitioned = false;
    }

    pub fn current_state(&self) -> State {
        self.state
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Processes one message to completion, including any transitions it
    /// causes and any deferred messages those transitions release.
    pub fn handle_message(&mut self, message: Message) {
        self.process(message);
        while self.transitioned && !self.deferred.is_empty() {
            self.transitioned = false;
            let released: Vec<Message> = self.deferred.drain(..).collect();
            for message in released {
                self.process(message);
            }
        }
        self.transitioned = false;
    }

    fn process(&mut self, message: Message) {
        let at = self.now_millis();
        self.log_recs.record(message.name(), self.state.name(), at);
        if self.log_recs.is_verbose() {
            debug!(message = message.name(), state = self.state.name(), "processing");
        }

        let mut message = message;
        let mut state = Some(self.state);
        while let Some(current) = state {
            match self.dispatch(current, message) {
                Flow::Handled => break,
                Flow::NotHandled(unhandled) => {
                    message = unhandled;
                    state = current.parent();
                }
            }
        }

        self.run_transitions();
    }

    pub(crate) fn transition_to(&mut self, target: State) {
        self.pending_transition = Some(target);
    }

    pub(crate) fn defer(&mut self, message: Message) {
        debug!(message = message.name(), state = self.state.name(), "deferring");
        self.deferred.push_back(message);
    }

    fn run_transitions(&mut self) {
        while let Some(target) = self.pending_transition.take() {
            if target == self.state {
                continue;
            }
            let from = self.state.path_to_root();
            let to = target.path_to_root();
            let common = to.iter().copied().find(|s| from.contains(s));

            for &leaving in from.iter().take_while(|s| Some(**s) != common) {
                self.exit(leaving);
            }

            let entering: Vec<State> = to
                .iter()
                .copied()
                .take_while(|s| Some(*s) != common)
                .collect();
            for &state in entering.iter().rev() {
                self.state = state;
                self.enter(state);
            }

            self.state = target;
            self.transitioned = true;
            info!(state = target.name(), "transitioned");
        }
    }

    fn now_millis(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    fn set_wifi_state(&mut self, state: WifiState) {
        if self.wifi_state == state {
            return;
        }
        let previous = self.wifi_state;
        self.wifi_state = state;
        info!(?state, ?previous, "wifi state changed");
        self.notify(Notification::WifiStateChanged { state, previous });
    }

    fn set_ap_state(&mut self, state: ApState, failure: Option<ApFailure>) {
        let previous = self.ap_state;
        self.ap_state = state;
        info!(?state, ?previous, "soft ap state changed");
        self.notify(Notification::ApStateChanged {
            state,
            previous,
            failure: if state == ApState::Failed {
                Some(failure.unwrap_or(ApFailure::General))
            } else {
                None
            },
            interface: self.interface.clone(),
            mode: self.mode,
        });
    }

    fn status(&self) -> RadioStatus {
        RadioStatus {
            mode: self.mode,
            state: self.state.name(),
            wifi_state: self.wifi_state,
            ap_state: self.ap_state,
            interface: self.interface.clone(),
            wifi_info: self.wifi_info.clone(),
            verbose_logging: self.log_recs.is_verbose(),
        }
    }
}
