//! Async handle to a running [`StateMachine`].
//!
//! [`spawn`] moves the machine onto the runtime's blocking pool, since
//! driver calls may wait on external commands, and drains the message
//! queue there until the queue closes or the shutdown token fires. The
//! returned [`WifiController`] is cheap to clone; each request method
//! enqueues a message and, where there is an answer, awaits it on a oneshot.

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::WifiError;
use crate::machine::{
    ActionResult, LogRec, Message, MessageReceiver, MessageSender, RadioStatus, StateMachine,
    WpsInfo, WpsResult,
};
use crate::metrics::WifiMetrics;
use crate::network::{NetworkId, RadioMode, SavedNetwork};
use crate::scan::ScanResult;
use crate::store::NetworkUpdateResult;

/// Creates the queue a [`StateMachine`] is built around.
pub fn message_channel() -> (MessageSender, MessageReceiver) {
    mpsc::unbounded_channel()
}

/// Starts the machine and processes messages until the queue closes or
/// `shutdown` is cancelled.
pub async fn run(mut machine: StateMachine, mut receiver: MessageReceiver, shutdown: CancellationToken) {
    machine.start();
    info!(state = machine.current_state().name(), "wifi controller started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("shutdown requested");
                break;
            }
            message = receiver.recv() => match message {
                Some(message) => machine.handle_message(message),
                None => break,
            },
        }
    }

    info!(mode = ?machine.mode(), "wifi controller stopped");
}

/// Runs [`run`] on a blocking thread and returns a handle bound to the
/// machine's queue.
pub fn spawn(
    machine: StateMachine,
    receiver: MessageReceiver,
    shutdown: CancellationToken,
) -> (WifiController, JoinHandle<()>) {
    let controller = WifiController::new(machine.sender());
    let runtime = tokio::runtime::Handle::current();
    let handle =
        tokio::task::spawn_blocking(move || runtime.block_on(run(machine, receiver, shutdown)));
    (controller, handle)
}

#[derive(Clone)]
pub struct WifiController {
    sender: MessageSender,
}

impl WifiController {
    pub fn new(sender: MessageSender) -> Self {
        Self { sender }
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| WifiError::ControllerStopped.into())
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Message) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx))?;
        rx.await.map_err(|_| WifiError::ControllerStopped.into())
    }

    pub async fn initialize(&self) -> Result<bool> {
        self.request(|reply| Message::Initialize { reply }).await
    }

    pub fn set_mode(&self, mode: RadioMode) -> Result<()> {
        self.send(Message::SetMode(mode))
    }

    pub async fn add_or_update_network(
        &self,
        network: SavedNetwork,
    ) -> Result<Option<NetworkUpdateResult>> {
        self.request(|reply| Message::AddOrUpdateNetwork { network, reply })
            .await
    }

    pub async fn remove_network(&self, network_id: NetworkId) -> Result<bool> {
        self.request(|reply| Message::RemoveNetwork { network_id, reply })
            .await
    }

    pub async fn enable_network(&self, network_id: NetworkId, disable_others: bool) -> Result<bool> {
        self.request(|reply| Message::EnableNetwork {
            network_id,
            disable_others,
            reply,
        })
        .await
    }

    pub async fn disable_network(&self, network_id: NetworkId) -> Result<bool> {
        self.request(|reply| Message::DisableNetwork { network_id, reply })
            .await
    }

    pub async fn connect_network(&self, network_id: NetworkId) -> Result<ActionResult> {
        self.request(|reply| Message::ConnectNetwork { network_id, reply })
            .await
    }

    pub fn reconnect(&self) -> Result<()> {
        self.send(Message::Reconnect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(Message::Disconnect)
    }

    pub fn start_scan(&self, channels: Option<Vec<u32>>) -> Result<()> {
        self.send(Message::StartScan { channels })
    }

    pub async fn start_wps(&self, info: Option<WpsInfo>) -> Result<WpsResult> {
        self.request(|reply| Message::StartWps { info, reply }).await
    }

    pub fn cancel_wps(&self) -> Result<()> {
        self.send(Message::CancelWps)
    }

    pub fn enable_verbose_logging(&self, verbose: bool) -> Result<()> {
        self.send(Message::EnableVerboseLogging(verbose))
    }

    pub async fn configured_networks(&self) -> Result<Vec<SavedNetwork>> {
        self.request(|reply| Message::GetConfiguredNetworks { reply })
            .await
    }

    pub async fn scan_results(&self) -> Result<Vec<ScanResult>> {
        self.request(|reply| Message::GetScanResults { reply }).await
    }

    pub async fn supported_features(&self) -> Result<u32> {
        self.request(|reply| Message::GetSupportedFeatures { reply })
            .await
    }

    pub async fn status(&self) -> Result<RadioStatus> {
        self.request(|reply| Message::GetStatus { reply }).await
    }

    pub async fn metrics(&self) -> Result<WifiMetrics> {
        self.request(|reply| Message::GetMetrics { reply }).await
    }

    pub async fn log_recs(&self) -> Result<Vec<LogRec>> {
        self.request(|reply| Message::GetLogRecs { reply }).await
    }
}
