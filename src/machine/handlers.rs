//! Per-state message handlers and entry/exit actions.

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::driver::{FEATURE_D2AP_RTT, FEATURE_D2D_RTT};
use crate::metrics::{ConnectionFailure, RoamType};
use crate::network::{DisableReason, NetworkId, RadioMode, SupplicantState};
use crate::notify::{ApFailure, ApState, NetworkState, Notification, WifiState};
use crate::pno::pno_networks;
use crate::recovery::RecoveryReason;
use crate::scan::{
    REPORT_EVENT_AFTER_EACH_SCAN, REPORT_EVENT_FULL_SCAN_RESULT, ScanBand, ScanSettings,
};
use crate::selector::{NetworkCandidate, SelectionRequest};

use super::message::reply;
use super::{
    ActionFailure, ActionResult, AuthFailureReason, DISCONNECTING_WATCHDOG_TIMEOUT, Flow, Message,
    RSSI_POLL_INTERVAL, Reply, SUPPLICANT_RESTART_DELAY, State, StateMachine, WpsFailure, WpsInfo,
    WpsResult, WpsSetup,
};

impl StateMachine {
    pub(super) fn dispatch(&mut self, state: State, message: Message) -> Flow {
        match state {
            State::Default => self.default_state(message),
            State::Initial => self.initial_state(message),
            State::SupplicantStarting => self.supplicant_starting_state(message),
            State::SupplicantStarted => self.supplicant_started_state(message),
            State::ConnectMode => self.connect_mode_state(message),
            State::Disconnected | State::Connecting | State::ScanMode => Flow::NotHandled(message),
            State::L2Connected => self.l2_connected_state(message),
            State::ObtainingIp | State::Connected => Flow::NotHandled(message),
            State::Disconnecting => self.disconnecting_state(message),
            State::WpsRunning => self.wps_running_state(message),
            State::SupplicantStopping => self.supplicant_stopping_state(message),
            State::SoftAp => self.soft_ap_state(message),
        }
    }

    pub(super) fn enter(&mut self, state: State) {
        match state {
            State::ConnectMode => self.enter_connect_mode(),
            State::Disconnected => self.enter_disconnected(),
            State::Connecting => self.notify_network_state(NetworkState::Connecting),
            State::L2Connected => self.schedule_rssi_poll(),
            State::ObtainingIp => self.enter_obtaining_ip(),
            State::Connected => self.enter_connected(),
            State::Disconnecting => self.enter_disconnecting(),
            State::SoftAp => self.enter_soft_ap(),
            State::ScanMode => info!(mode = ?self.mode, "scan only"),
            _ => {}
        }
    }

    pub(super) fn exit(&mut self, state: State) {
        match state {
            State::ConnectMode => {
                let now = self.now_millis();
                self.metrics
                    .end_connection_event(Some(ConnectionFailure::Cancelled), now);
                self.wifi_info.reset();
                self.target_network_id = None;
                self.link_pending = false;
                self.set_wifi_state(WifiState::Disabled);
            }
            State::Disconnected => {
                if self.pno_running {
                    if let Err(e) = self.driver.stop_pno_scan() {
                        debug!(error = %e, "failed to stop pno scan");
                    }
                    self.pno_running = false;
                }
            }
            State::L2Connected => {
                self.ip_client.stop();
                self.rssi_poll_token += 1;
                self.dhcp_results = None;
            }
            State::Disconnecting => self.disconnecting_token += 1,
            State::WpsRunning => {
                if self.wps_running {
                    if let Err(e) = self.driver.cancel_wps() {
                        warn!(error = %e, "failed to cancel WPS");
                    }
                    self.wps_running = false;
                }
            }
            State::SoftAp => {
                self.driver.teardown_interfaces();
                self.interface = None;
            }
            _ => {}
        }
    }

    // DefaultState: queries, profile edits, crash escalation, and a sink
    // for anything no other state wanted.
    fn default_state(&mut self, message: Message) -> Flow {
        match message {
            Message::Initialize { reply: tx } => reply(tx, self.driver.initialize_vendor_hal()),
            Message::AddOrUpdateNetwork { network, reply: tx } => {
                reply(tx, self.store.add_or_update(network))
            }
            Message::RemoveNetwork {
                network_id,
                reply: tx,
            } => reply(tx, self.store.remove(network_id)),
            Message::EnableNetwork {
                network_id,
                reply: tx,
                ..
            } => reply(tx, self.store.enable_network(network_id)),
            Message::DisableNetwork {
                network_id,
                reply: tx,
            } => reply(
                tx,
                self.store.disable_network(network_id, DisableReason::ByUser),
            ),
            Message::ConnectNetwork {
                network_id,
                reply: tx,
            } => {
                let failure = if self.store.get(network_id).is_none() {
                    ActionFailure::InvalidArgs
                } else {
                    ActionFailure::Busy
                };
                reply(tx, ActionResult::Failed(failure));
            }
            Message::StartWps { reply: tx, .. } => reply(tx, WpsResult::Failed(WpsFailure::Error)),
            Message::GetConfiguredNetworks { reply: tx } => reply(tx, self.store.saved_networks()),
            Message::GetScanResults { reply: tx } => reply(tx, self.scan_results.clone()),
            Message::GetSupportedFeatures { reply: tx } => reply(tx, self.supported_features()),
            Message::GetStatus { reply: tx } => reply(tx, self.status()),
            Message::GetMetrics { reply: tx } => reply(tx, self.metrics.clone()),
            Message::GetLogRecs { reply: tx } => reply(tx, self.log_recs.snapshot()),
            Message::EnableVerboseLogging(verbose) => {
                info!(verbose, "verbose logging");
                self.log_recs.set_verbose(verbose);
            }
            Message::RestartWifiStack { reason } => self.restart_wifi_stack(reason),
            Message::VendorHalDied => {
                error!("vendor HAL died");
                self.metrics.num_hal_crashes += 1;
                self.recovery.trigger(RecoveryReason::HalCrash);
            }
            Message::WificondDied => {
                error!("wificond died");
                self.metrics.num_wificond_crashes += 1;
                self.recovery.trigger(RecoveryReason::WificondCrash);
            }
            Message::SoftApStateChanged { state, failure } => self.set_ap_state(state, failure),
            Message::ScanFailed => {
                self.metrics.num_scan_failures += 1;
                self.notify(Notification::ScanFailed);
            }
            other => debug!(
                message = other.name(),
                state = self.state.name(),
                "message not handled"
            ),
        }
        Flow::Handled
    }

    fn initial_state(&mut self, message: Message) -> Flow {
        match message {
            Message::SetMode(mode) => self.start_mode(mode),
            Message::RestartSupplicant => {
                if self.mode.is_client() {
                    info!(mode = ?self.mode, "restarting authentication daemon");
                    self.start_mode(self.mode);
                }
            }
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn supplicant_starting_state(&mut self, message: Message) -> Flow {
        match message {
            Message::SupplicantConnected => {
                info!("authentication daemon connected");
                self.wifi_info.reset();
                if self.mode == RadioMode::Connect {
                    self.transition_to(State::Disconnected);
                } else {
                    self.transition_to(State::ScanMode);
                }
            }
            Message::SupplicantDisconnected => {
                warn!("authentication daemon failed to start");
                self.metrics.num_supplicant_start_failures += 1;
                self.driver.teardown_interfaces();
                self.interface = None;
                self.mode = RadioMode::Disabled;
                self.transition_to(State::Initial);
            }
            Message::SetMode(_) => self.defer(message),
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn supplicant_started_state(&mut self, message: Message) -> Flow {
        match message {
            Message::SetMode(mode) => self.switch_client_mode(mode),
            Message::StartScan { channels } => self.start_scan(channels),
            Message::ScanResultsAvailable => self.cache_scan_results(),
            Message::StartWps { info, reply: tx } => self.start_wps(info, tx),
            Message::SupplicantDisconnected => {
                error!("authentication daemon died");
                self.metrics.num_supplicant_crashes += 1;
                self.ip_client.stop();
                self.driver.teardown_interfaces();
                self.interface = None;
                self.transition_to(State::Initial);
                self.scheduler
                    .schedule(SUPPLICANT_RESTART_DELAY, Message::RestartSupplicant);
            }
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn supplicant_stopping_state(&mut self, message: Message) -> Flow {
        match message {
            Message::SupplicantDisconnected => {
                info!("authentication daemon stopped");
                self.driver.teardown_interfaces();
                self.interface = None;
                self.transition_to(State::Initial);
            }
            Message::SetMode(_) => self.defer(message),
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn connect_mode_state(&mut self, message: Message) -> Flow {
        match message {
            Message::EnableNetwork {
                network_id,
                disable_others,
                reply: tx,
            } => {
                if self.store.get(network_id).is_none() {
                    reply(tx, false);
                } else {
                    self.store.enable_network(network_id);
                    let ok = !disable_others || self.user_selected_connect(network_id);
                    reply(tx, ok);
                }
            }
            Message::ConnectNetwork {
                network_id,
                reply: tx,
            } => {
                let result = if self.store.get(network_id).is_none() {
                    ActionResult::Failed(ActionFailure::InvalidArgs)
                } else if self.state.is_within(State::L2Connected)
                    && self.target_network_id == Some(network_id)
                {
                    info!(network_id, "already connected");
                    ActionResult::Succeeded
                } else {
                    self.store.enable_network(network_id);
                    if self.user_selected_connect(network_id) {
                        ActionResult::Succeeded
                    } else {
                        ActionResult::Failed(ActionFailure::Error)
                    }
                };
                reply(tx, result);
            }
            Message::RemoveNetwork {
                network_id,
                reply: tx,
            } => {
                let current = self.target_network_id == Some(network_id);
                let removed = self.store.remove(network_id);
                if removed && current {
                    self.disconnect_current();
                }
                reply(tx, removed);
            }
            Message::DisableNetwork {
                network_id,
                reply: tx,
            } => {
                let current = self.target_network_id == Some(network_id);
                let disabled = self.store.disable_network(network_id, DisableReason::ByUser);
                if disabled && current {
                    self.disconnect_current();
                }
                reply(tx, disabled);
            }
            Message::Reconnect => {
                if let Err(e) = self.driver.reconnect() {
                    warn!(error = %e, "reconnect failed");
                }
            }
            Message::Disconnect => self.disconnect_current(),
            Message::NetworkConnected { bssid } => {
                info!(%bssid, "link layer connected");
                self.wifi_info.bssid = Some(bssid.clone());
                self.wifi_info.network_id = self.target_network_id;
                self.metrics.set_current_event_bssid(&bssid);
                self.link_pending = true;
            }
            Message::SupplicantStateChanged { state, ssid, bssid } => {
                if state == SupplicantState::Completed
                    && matches!(self.state, State::Disconnected | State::Connecting)
                    && !self.is_target_ssid(ssid.as_deref())
                {
                    debug!(?ssid, network_id = ?self.target_network_id, "dropping stale link");
                    self.link_pending = false;
                    self.wifi_info.bssid = None;
                    return Flow::Handled;
                }
                self.update_supplicant_state(state, ssid, bssid);
                match state {
                    SupplicantState::Completed
                        if self.link_pending
                            && matches!(self.state, State::Disconnected | State::Connecting) =>
                    {
                        self.link_pending = false;
                        self.transition_to(State::ObtainingIp);
                    }
                    SupplicantState::Disconnected
                        if self.state.is_within(State::L2Connected)
                            || self.state == State::Disconnecting =>
                    {
                        self.transition_to(State::Disconnected);
                    }
                    _ => {}
                }
            }
            Message::NetworkDisconnected {
                bssid,
                reason_code,
                locally_generated,
            } => {
                info!(?bssid, reason_code, locally_generated, "link layer disconnected");
                let now = self.now_millis();
                self.metrics
                    .end_connection_event(Some(ConnectionFailure::NetworkDisconnection), now);
                self.link_pending = false;
                self.wifi_info.reset();
                self.transition_to(State::Disconnected);
            }
            Message::AuthenticationFailure { reason } => self.on_authentication_failure(reason),
            Message::ScanResultsAvailable => {
                self.cache_scan_results();
                if matches!(self.state, State::Disconnected | State::Connected) {
                    self.auto_join();
                }
            }
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn l2_connected_state(&mut self, message: Message) -> Flow {
        match message {
            Message::IpProvisioningSuccess(results) => {
                info!(ip = %results.ip_address, gateway = ?results.gateway, "ip provisioning succeeded");
                self.wifi_info.ip_address = Some(results.ip_address.clone());
                self.dhcp_results = Some(results);
                if self.state == State::ObtainingIp {
                    self.transition_to(State::Connected);
                }
            }
            Message::IpProvisioningFailure => {
                warn!("ip provisioning failed");
                let now = self.now_millis();
                self.metrics.num_dhcp_failures += 1;
                self.metrics
                    .end_connection_event(Some(ConnectionFailure::DhcpFailure), now);
                if let Some(id) = self.target_network_id {
                    self.store.disable_network(id, DisableReason::DhcpFailure);
                }
                if let Err(e) = self.driver.disconnect() {
                    warn!(error = %e, "disconnect after ip failure failed");
                }
                self.transition_to(State::Disconnecting);
            }
            Message::RssiPoll { token } => self.on_rssi_poll(token),
            Message::NetworkConnected { bssid } => {
                info!(%bssid, "roamed");
                self.wifi_info.bssid = Some(bssid.clone());
                self.metrics.set_current_event_bssid(&bssid);
                if self.state == State::Connected {
                    let now = self.now_millis();
                    self.metrics.end_connection_event(None, now);
                }
            }
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn disconnecting_state(&mut self, message: Message) -> Flow {
        match message {
            Message::DisconnectingWatchdog { token } => {
                if token == self.disconnecting_token {
                    warn!("disconnect timed out");
                    self.wifi_info.reset();
                    self.transition_to(State::Disconnected);
                }
            }
            Message::SetMode(_) | Message::ConnectNetwork { .. } => self.defer(message),
            Message::IpProvisioningSuccess(_) | Message::IpProvisioningFailure => {}
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn wps_running_state(&mut self, message: Message) -> Flow {
        match message {
            Message::NetworkConnected { bssid } => {
                info!(%bssid, "WPS completed");
                self.wps_running = false;
                for mut network in self.driver.migrate_networks() {
                    // the daemon's ids mean nothing here
                    network.network_id = None;
                    match self.store.add_or_update(network) {
                        Some(result) => {
                            self.store.enable_network(result.network_id);
                        }
                        None => warn!("dropping migrated network without ssid"),
                    }
                }
                self.notify(Notification::WpsCompleted);
                self.wifi_info.bssid = Some(bssid);
                if self.wifi_info.supplicant_state == SupplicantState::Completed {
                    self.transition_to(State::ObtainingIp);
                } else {
                    self.link_pending = true;
                    self.transition_to(State::Disconnected);
                }
            }
            Message::WpsFailed | Message::WpsTimeout => {
                warn!(message = message.name(), "WPS failed");
                self.wps_running = false;
                self.notify(Notification::WpsFailed);
                self.transition_to(State::Disconnected);
            }
            Message::CancelWps => {
                info!("WPS cancelled");
                if let Err(e) = self.driver.cancel_wps() {
                    warn!(error = %e, "failed to cancel WPS");
                }
                self.wps_running = false;
                self.notify(Notification::WpsFailed);
                self.transition_to(State::Disconnected);
            }
            Message::StartWps { reply: tx, .. } => {
                reply(tx, WpsResult::Failed(WpsFailure::InProgress))
            }
            Message::SupplicantStateChanged { state, ssid, bssid } => {
                self.update_supplicant_state(state, ssid, bssid)
            }
            Message::NetworkDisconnected { .. } | Message::AuthenticationFailure { .. } => {}
            Message::ConnectNetwork { .. }
            | Message::EnableNetwork { .. }
            | Message::Disconnect
            | Message::Reconnect => self.defer(message),
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn soft_ap_state(&mut self, message: Message) -> Flow {
        match message {
            Message::SoftApStateChanged { state, failure } => {
                self.set_ap_state(state, failure);
                if matches!(state, ApState::Disabled | ApState::Failed) {
                    if state == ApState::Failed {
                        self.soft_ap.stop();
                    }
                    self.mode = RadioMode::Disabled;
                    self.transition_to(State::Initial);
                }
            }
            Message::SetMode(mode) => {
                if mode != self.mode {
                    info!(?mode, "stopping soft ap for mode change");
                    self.soft_ap.stop();
                    self.defer(message);
                }
            }
            other => return Flow::NotHandled(other),
        }
        Flow::Handled
    }

    fn start_mode(&mut self, mode: RadioMode) {
        if mode == RadioMode::Disabled {
            self.mode = RadioMode::Disabled;
            return;
        }

        if mode.is_client() {
            let interface = match self.driver.setup_client_interface() {
                Ok(interface) => interface,
                Err(e) => {
                    warn!(error = %e, "failed to set up client interface");
                    self.metrics.num_setup_client_interface_failures += 1;
                    return;
                }
            };
            if let Err(e) = self.driver.enable_supplicant() {
                warn!(error = %e, "failed to start authentication daemon");
                self.metrics.num_supplicant_start_failures += 1;
                self.driver.teardown_interfaces();
                return;
            }
            info!(%interface, ?mode, "client interface up");
            self.interface = Some(interface);
            self.mode = mode;
            self.transition_to(State::SupplicantStarting);
        } else {
            match self.driver.setup_soft_ap_interface() {
                Ok(interface) => {
                    info!(%interface, ?mode, "soft ap interface up");
                    self.interface = Some(interface);
                    self.mode = mode;
                    self.transition_to(State::SoftAp);
                }
                Err(e) => {
                    warn!(error = %e, "failed to set up soft ap interface");
                    self.metrics.num_setup_soft_ap_interface_failures += 1;
                    // the failure is reported against the requested mode
                    let previous = self.mode;
                    self.mode = mode;
                    self.set_ap_state(ApState::Failed, Some(ApFailure::General));
                    self.mode = previous;
                }
            }
        }
    }

    fn switch_client_mode(&mut self, mode: RadioMode) {
        if mode == self.mode {
            return;
        }
        info!(from = ?self.mode, to = ?mode, "switching mode");
        match mode {
            RadioMode::Connect => {
                self.mode = mode;
                self.transition_to(State::Disconnected);
            }
            RadioMode::ScanOnly | RadioMode::ScanOnlyNoWifi => {
                if self.state.is_within(State::L2Connected) || self.state == State::Connecting {
                    if let Err(e) = self.driver.disconnect() {
                        warn!(error = %e, "disconnect before scan only mode failed");
                    }
                }
                self.mode = mode;
                self.transition_to(State::ScanMode);
            }
            RadioMode::Disabled | RadioMode::SoftApTethered | RadioMode::SoftApLocalOnly => {
                self.mode = RadioMode::Disabled;
                if mode.is_soft_ap() {
                    self.defer(Message::SetMode(mode));
                }
                match self.driver.disable_supplicant() {
                    Ok(()) => self.transition_to(State::SupplicantStopping),
                    Err(e) => {
                        warn!(error = %e, "failed to stop authentication daemon");
                        self.ip_client.stop();
                        self.driver.teardown_interfaces();
                        self.interface = None;
                        self.transition_to(State::Initial);
                    }
                }
            }
        }
    }

    fn restart_wifi_stack(&mut self, reason: RecoveryReason) {
        warn!(reason = reason.name(), state = self.state.name(), "restarting wifi stack");
        self.metrics.record_self_recovery(reason);
        let mode = self.mode;

        if self.state == State::SoftAp {
            self.soft_ap.stop();
            self.set_ap_state(ApState::Disabled, None);
        }
        self.ip_client.stop();
        self.driver.teardown_interfaces();
        self.interface = None;
        self.mode = RadioMode::Disabled;
        self.transition_to(State::Initial);

        if mode != RadioMode::Disabled && self.sender.send(Message::SetMode(mode)).is_err() {
            debug!("queue closed, not restoring mode");
        }
    }

    fn start_scan(&mut self, channels: Option<Vec<u32>>) {
        let channels = channels.filter(|c| !c.is_empty());
        let band = match (&channels, self.mode) {
            (Some(_), _) => ScanBand::Unspecified,
            (None, RadioMode::Connect) => ScanBand::BothWithDfs,
            (None, _) => ScanBand::Both,
        };
        let settings = ScanSettings {
            band,
            channels: channels.unwrap_or_default(),
            hidden_networks: self.store.hidden_network_ssids(),
            report_events: REPORT_EVENT_AFTER_EACH_SCAN | REPORT_EVENT_FULL_SCAN_RESULT,
        };

        self.metrics.num_scans += 1;
        debug!(?settings, "starting scan");
        if let Err(e) = self.driver.start_scan(&settings) {
            warn!(error = %e, "scan request failed");
            self.metrics.num_scan_failures += 1;
            self.notify(Notification::ScanFailed);
        }
    }

    fn cache_scan_results(&mut self) {
        self.scan_results = self.driver.scan_results();
        debug!(count = self.scan_results.len(), "scan results available");
        self.notify(Notification::ScanResultsAvailable {
            count: self.scan_results.len(),
        });
    }

    fn start_wps(&mut self, info: Option<WpsInfo>, tx: Reply<WpsResult>) {
        let Some(info) = info else {
            warn!("WPS requested without a configuration");
            reply(tx, WpsResult::Failed(WpsFailure::Error));
            return;
        };

        let bssid = info.bssid.as_deref();
        let started = match info.setup {
            WpsSetup::PushButton => self.driver.start_wps_pbc(bssid).map(|_| None),
            WpsSetup::PinDisplay => self.driver.start_wps_pin_display(bssid).map(Some),
            WpsSetup::PinKeypad => match info.pin.as_deref() {
                Some(pin) => self.driver.start_wps_pin_keypad(pin).map(|_| None),
                None => Err(anyhow!("keypad WPS needs a PIN")),
            },
        };

        match started {
            Ok(pin) => {
                info!(setup = ?info.setup, "WPS started");
                self.wps_running = true;
                // joining a network through WPS implies connect mode
                self.mode = RadioMode::Connect;
                reply(tx, WpsResult::Started { pin });
                self.transition_to(State::WpsRunning);
            }
            Err(e) => {
                warn!(error = %e, "failed to start WPS");
                reply(tx, WpsResult::Failed(WpsFailure::Error));
            }
        }
    }

    fn user_selected_connect(&mut self, network_id: NetworkId) -> bool {
        self.selector
            .set_user_connect_choice(network_id, self.store.as_mut());
        let now = self.now_millis();
        self.store.set_last_selected(network_id, now);
        self.start_connect(network_id, RoamType::UserSelected)
    }

    fn start_connect(&mut self, network_id: NetworkId, roam_type: RoamType) -> bool {
        let Some(network) = self.store.get(network_id).cloned() else {
            return false;
        };
        info!(network_id, ssid = %network.ssid, ?roam_type, "connecting");

        let now = self.now_millis();
        self.metrics
            .start_connection_event(&network.ssid, None, roam_type, now);

        if let Err(e) = self.driver.remove_all_networks() {
            warn!(error = %e, "failed to clear daemon networks");
        }
        if let Err(e) = self.driver.connect_to_network(&network) {
            warn!(error = %e, network_id, "connect request failed");
            self.metrics
                .end_connection_event(Some(ConnectionFailure::Unknown), now);
            return false;
        }

        self.target_network_id = Some(network_id);
        self.link_pending = false;
        self.transition_to(State::Connecting);
        true
    }

    fn disconnect_current(&mut self) {
        if self.state.is_within(State::L2Connected) {
            if let Err(e) = self.driver.disconnect() {
                warn!(error = %e, "disconnect failed");
            }
            self.transition_to(State::Disconnecting);
        } else if self.state == State::Connecting {
            if let Err(e) = self.driver.disconnect() {
                warn!(error = %e, "disconnect failed");
            }
            let now = self.now_millis();
            self.metrics
                .end_connection_event(Some(ConnectionFailure::Cancelled), now);
            self.wifi_info.reset();
            self.transition_to(State::Disconnected);
        }
    }

    /// Whether a link report for `ssid` belongs to the attempt in flight.
    fn is_target_ssid(&self, ssid: Option<&str>) -> bool {
        let (Some(ssid), Some(network_id)) = (ssid, self.target_network_id) else {
            return true;
        };
        self.store
            .get(network_id)
            .is_none_or(|network| network.ssid == ssid)
    }

    fn update_supplicant_state(
        &mut self,
        state: SupplicantState,
        ssid: Option<String>,
        bssid: Option<String>,
    ) {
        self.wifi_info.supplicant_state = state;
        if ssid.is_some() {
            self.wifi_info.ssid = ssid;
        }
        if bssid.is_some() {
            self.wifi_info.bssid = bssid;
        }
    }

    fn on_authentication_failure(&mut self, reason: AuthFailureReason) {
        warn!(?reason, network_id = ?self.target_network_id, "authentication failure");
        let now = self.now_millis();
        self.metrics.num_authentication_failures += 1;
        self.metrics
            .end_connection_event(Some(ConnectionFailure::AuthenticationFailure), now);

        if let Some(bssid) = self.wifi_info.bssid.as_deref() {
            self.blacklist.record_failure(bssid, self.clock.elapsed());
        }
        if reason == AuthFailureReason::WrongPassword {
            if let Some(id) = self.target_network_id {
                self.store.disable_network(id, DisableReason::WrongPassword);
            }
        }

        self.link_pending = false;
        self.wifi_info.reset();
        self.transition_to(State::Disconnected);
    }

    fn auto_join(&mut self) {
        let blacklist = self.blacklist.blacklisted(self.clock.elapsed());
        let connected = self.state == State::Connected;
        let request = SelectionRequest {
            scan_results: &self.scan_results,
            blacklist: &blacklist,
            wifi_info: &self.wifi_info,
            connected,
            disconnected: self.state == State::Disconnected,
            untrusted_network_allowed: self.untrusted_networks_allowed,
        };
        let Some(candidate) = self.selector.select_network(&request, self.store.as_mut()) else {
            return;
        };

        if connected && self.target_network_id == Some(candidate.network_id) {
            if self.wifi_info.bssid.as_deref() != Some(candidate.bssid.as_str()) {
                self.roam(candidate);
            }
        } else {
            let roam_type = if connected {
                RoamType::Unrelated
            } else {
                RoamType::None
            };
            self.start_connect(candidate.network_id, roam_type);
        }
    }

    fn roam(&mut self, candidate: NetworkCandidate) {
        let Some(network) = self.store.get(candidate.network_id).cloned() else {
            return;
        };
        info!(bssid = %candidate.bssid, ssid = %network.ssid, "roaming");
        let now = self.now_millis();
        self.metrics.start_connection_event(
            &network.ssid,
            Some(&candidate.bssid),
            RoamType::Roam,
            now,
        );
        if let Err(e) = self.driver.roam_to_network(&network, &candidate.bssid) {
            warn!(error = %e, "roam request failed");
            self.metrics
                .end_connection_event(Some(ConnectionFailure::Unknown), now);
        }
    }

    fn schedule_rssi_poll(&mut self) {
        self.rssi_poll_token += 1;
        self.scheduler.schedule(
            RSSI_POLL_INTERVAL,
            Message::RssiPoll {
                token: self.rssi_poll_token,
            },
        );
    }

    fn on_rssi_poll(&mut self, token: u64) {
        if token != self.rssi_poll_token {
            return;
        }
        if let Some(poll) = self.driver.signal_poll() {
            self.wifi_info.rssi = poll.rssi;
            self.wifi_info.link_speed = poll.link_speed;
            if poll.frequency > 0 {
                self.wifi_info.frequency = poll.frequency;
            }
            self.wifi_info.tx_success_rate = poll.tx_success_rate;
            self.wifi_info.tx_bad_rate = poll.tx_bad_rate;
            self.wifi_info.rx_success_rate = poll.rx_success_rate;
        }
        if self.state == State::Connected {
            self.scorer
                .calculate_and_report(&self.wifi_info, &mut self.metrics);
        }
        self.schedule_rssi_poll();
    }

    fn supported_features(&mut self) -> u32 {
        let features = self.driver.supported_features();
        if self.disable_rtt {
            features & !(FEATURE_D2D_RTT | FEATURE_D2AP_RTT)
        } else {
            features
        }
    }

    fn notify_network_state(&self, state: NetworkState) {
        self.notify(Notification::NetworkStateChanged {
            state,
            network_id: self.target_network_id,
            bssid: self.wifi_info.bssid.clone(),
        });
    }

    fn enter_connect_mode(&mut self) {
        self.wifi_info.reset();
        if !self.wps_running {
            if let Err(e) = self.driver.remove_all_networks() {
                warn!(error = %e, "failed to clear daemon networks");
            }
        }
        if self.wifi_state != WifiState::Enabled {
            self.set_wifi_state(WifiState::Enabling);
            self.set_wifi_state(WifiState::Enabled);
        }
    }

    fn enter_disconnected(&mut self) {
        self.target_network_id = None;
        self.notify_network_state(NetworkState::Disconnected);

        let networks = pno_networks(&self.store.saved_networks());
        if networks.is_empty() {
            return;
        }
        match self.driver.start_pno_scan(&networks) {
            Ok(()) => {
                debug!(count = networks.len(), "pno scan started");
                self.pno_running = true;
            }
            Err(e) => debug!(error = %e, "pno scan not started"),
        }
    }

    fn enter_obtaining_ip(&mut self) {
        if self.target_network_id.is_none() {
            // link brought up without a connect request, e.g. by WPS
            if let Some(ssid) = self.wifi_info.ssid.as_deref() {
                self.target_network_id = self
                    .store
                    .saved_networks()
                    .into_iter()
                    .find(|n| n.ssid == ssid)
                    .and_then(|n| n.network_id);
            }
        }
        self.wifi_info.network_id = self.target_network_id;
        self.notify_network_state(NetworkState::ObtainingIp);

        match self.interface.as_deref() {
            Some(interface) => self.ip_client.start_provisioning(interface),
            None => warn!("no interface to provision"),
        }
    }

    fn enter_connected(&mut self) {
        if let Some(id) = self.target_network_id {
            self.store.mark_connected(id);
        }
        let now = self.now_millis();
        self.metrics.end_connection_event(None, now);
        if let Some(bssid) = self.wifi_info.bssid.clone() {
            self.blacklist.clear(&bssid);
        }
        self.scorer.reset();
        info!(
            network_id = ?self.target_network_id,
            bssid = ?self.wifi_info.bssid,
            ip = ?self.wifi_info.ip_address,
            "connected"
        );
        self.notify_network_state(NetworkState::Connected);
    }

    fn enter_disconnecting(&mut self) {
        self.disconnecting_token += 1;
        self.scheduler.schedule(
            DISCONNECTING_WATCHDOG_TIMEOUT,
            Message::DisconnectingWatchdog {
                token: self.disconnecting_token,
            },
        );
        self.notify_network_state(NetworkState::Disconnecting);
    }

    fn enter_soft_ap(&mut self) {
        let started = match self.interface.as_deref() {
            Some(interface) => self
                .soft_ap
                .start(interface, &self.soft_ap_config, self.mode),
            None => Err(anyhow!("no soft ap interface")),
        };
        if let Err(e) = started {
            warn!(error = %e, "failed to start soft ap");
            self.set_ap_state(ApState::Failed, Some(ApFailure::General));
            self.mode = RadioMode::Disabled;
            self.transition_to(State::Initial);
        }
    }
}
