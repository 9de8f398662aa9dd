use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wifi_manager::{
    clock::SystemClock,
    config::{self, Config, NetworkConfig},
    controller,
    error::WifiError,
    machine::{Collaborators, StateMachine, TokioScheduler},
    network::RadioMode,
    nmcli::{self, NmcliDriver, NmcliIpClient, NmcliSoftAp, Worker},
    notify::BroadcastNotifier,
    scan,
    server::{self, ServerConfig},
    store::{ConfigStore, SavedNetworkStore},
};

#[derive(Parser)]
#[command(name = "wifi-manager")]
#[command(about = "Manage a WiFi radio: client mode, access point, network selection and recovery")]
#[command(version)]
struct Cli {
    /// Port of the running daemon's control API (defaults to the configured one)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Disabled,
    ScanOnly,
    Connect,
    Hotspot,
    LocalOnlyAp,
}

impl From<ModeArg> for RadioMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Disabled => RadioMode::Disabled,
            ModeArg::ScanOnly => RadioMode::ScanOnly,
            ModeArg::Connect => RadioMode::Connect,
            ModeArg::Hotspot => RadioMode::SoftApTethered,
            ModeArg::LocalOnlyAp => RadioMode::SoftApLocalOnly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available WiFi interfaces
    ListInterfaces,

    /// Scan for WiFi networks without the daemon
    Scan {
        /// Interface to use (defaults to the first built-in adapter)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Run the manager daemon in the foreground
    Run {
        /// Interface to manage (defaults to the configured one, then auto-detect)
        #[arg(short, long)]
        interface: Option<String>,

        /// Mode to start in
        #[arg(short, long, value_enum, default_value = "connect")]
        mode: ModeArg,
    },

    /// Show the daemon's radio status
    Status,

    /// Connect the daemon to a network, adding it if needed
    Connect {
        /// SSID of the network to connect to
        ssid: String,

        /// Password for the network (uses saved password if not provided)
        #[arg(short, long)]
        password: Option<String>,

        /// Save credentials to config file
        #[arg(short, long)]
        save: bool,
    },

    /// Disconnect from the current network
    Disconnect,

    /// Switch the radio mode
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },

    /// Save network credentials to config file
    SaveNetwork {
        /// SSID of the network
        ssid: String,

        /// Password for the network (omit for open networks)
        #[arg(short, long)]
        password: Option<String>,

        /// The network does not broadcast its SSID
        #[arg(long)]
        hidden: bool,
    },

    /// Show saved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let port = cli.port;

    match cli.command {
        Commands::ListInterfaces => cmd_list_interfaces(),
        Commands::Scan { interface } => cmd_scan(interface.as_deref()),
        Commands::Run { interface, mode } => cmd_run(interface, mode.into(), port).await,
        Commands::Status => cmd_status(port),
        Commands::Connect {
            ssid,
            password,
            save,
        } => cmd_connect(&ssid, password, save, port),
        Commands::Disconnect => cmd_disconnect(port),
        Commands::Mode { mode } => cmd_mode(mode.into(), port),
        Commands::SaveNetwork {
            ssid,
            password,
            hidden,
        } => cmd_save_network(&ssid, password, hidden),
        Commands::ShowConfig => cmd_show_config(),
    }
}

fn cmd_list_interfaces() -> Result<()> {
    let interfaces = nmcli::list_wifi_interfaces()?;

    if interfaces.is_empty() {
        println!("No WiFi interfaces found.");
        return Ok(());
    }

    println!("{:<16} {:<12} {}", "INTERFACE", "STATE", "TYPE");
    println!("{}", "-".repeat(40));

    for iface in interfaces {
        let iface_type = if iface.is_usb { "USB" } else { "Built-in" };
        println!("{:<16} {:<12} {}", iface.name, iface.state, iface_type);
    }

    Ok(())
}

fn cmd_scan(interface: Option<&str>) -> Result<()> {
    let iface = nmcli::resolve_interface(interface)?;
    println!("Scanning on interface: {}", iface.name);
    println!();

    let results = nmcli::scan_networks(&iface.name)?;
    scan::display_scan_results(&results);

    Ok(())
}

async fn cmd_run(interface: Option<String>, mode: RadioMode, port: Option<u16>) -> Result<()> {
    let cfg = Config::load()?;
    let mut settings = cfg.settings.clone();
    if let Some(port) = port {
        settings.api_port = port;
    }
    let interface = interface.or_else(|| cfg.default_interface.clone());

    let mut store = SavedNetworkStore::new();
    for network in cfg.saved_networks() {
        let ssid = network.ssid.clone();
        if store.add_or_update(network).is_none() {
            warn!(%ssid, "skipping invalid saved network");
        }
    }
    info!(networks = store.len(), "loaded saved networks");

    let (sender, receiver) = controller::message_channel();
    let worker = Worker::spawn();
    let notifier = BroadcastNotifier::new(64);
    log_notifications(&notifier);

    let collaborators = Collaborators {
        driver: Box::new(NmcliDriver::new(interface, sender.clone(), worker.clone())),
        ip_client: Box::new(NmcliIpClient::new(sender.clone(), worker.clone())),
        soft_ap: Box::new(NmcliSoftAp::new(sender.clone(), worker)),
        notifier: Box::new(notifier),
        store: Box::new(store),
        scheduler: Box::new(TokioScheduler::new(sender.clone())),
        clock: Arc::new(SystemClock::new()),
        score_sink: None,
    };
    let machine = StateMachine::new(collaborators, &settings, sender);

    let shutdown = CancellationToken::new();
    let (ctrl, machine_task) = controller::spawn(machine, receiver, shutdown.clone());

    if !ctrl.initialize().await? {
        warn!("NetworkManager is not reachable, the radio will fail to start");
    }
    ctrl.set_mode(mode)?;

    let server_task = tokio::spawn(server::run_server(
        ServerConfig {
            port: settings.api_port,
        },
        ctrl,
        shutdown.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutting down");
    shutdown.cancel();

    machine_task.await?;
    server_task.await??;
    Ok(())
}

fn log_notifications(notifier: &BroadcastNotifier) {
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(notification) => info!(?notification, "notification"),
                Err(RecvError::Lagged(missed)) => debug!(missed, "notification log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn api_url(port: Option<u16>, path: &str) -> String {
    let port = port.unwrap_or_else(|| {
        Config::load()
            .map(|c| c.settings.api_port)
            .unwrap_or(config::DEFAULT_API_PORT)
    });
    format!("http://127.0.0.1:{}{}", port, path)
}

fn daemon_error(err: ureq::Error) -> anyhow::Error {
    let message = match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            format!("HTTP {}: {}", code, body.trim())
        }
        ureq::Error::Transport(t) => format!("{} (is `wifi-manager run` running?)", t),
    };
    WifiError::DaemonRequest(message).into()
}

fn cmd_status(port: Option<u16>) -> Result<()> {
    let status: Value = ureq::get(&api_url(port, "/status"))
        .call()
        .map_err(daemon_error)?
        .into_json()?;

    let text = |v: &Value| v.as_str().unwrap_or("-").to_string();
    let info = &status["wifi_info"];

    println!("Mode:      {}", text(&status["mode"]));
    println!("State:     {}", text(&status["state"]));
    println!("WiFi:      {}", text(&status["wifi_state"]));
    println!("AP:        {}", text(&status["ap_state"]));
    println!("Interface: {}", text(&status["interface"]));
    if let Some(ssid) = info["ssid"].as_str() {
        println!("Network:   {} ({})", ssid, text(&info["bssid"]));
        println!("Signal:    {} dBm @ {} MHz", info["rssi"], info["frequency"]);
        println!("IP:        {}", text(&info["ip_address"]));
    }

    Ok(())
}

fn cmd_connect(ssid: &str, password: Option<String>, save: bool, port: Option<u16>) -> Result<()> {
    let mut cfg = Config::load().unwrap_or_default();

    let network = match (password, cfg.find_network(ssid)) {
        (Some(password), _) => NetworkConfig {
            ssid: ssid.to_string(),
            password: Some(password),
            security: None,
            hidden: false,
            trusted: true,
        },
        (None, Some(saved)) => {
            println!("Using saved credentials for '{}'", ssid);
            saved.clone()
        }
        (None, None) => NetworkConfig {
            ssid: ssid.to_string(),
            password: None,
            security: None,
            hidden: false,
            trusted: true,
        },
    };

    let added: Value = ureq::post(&api_url(port, "/networks"))
        .send_json(json!(network))
        .map_err(daemon_error)?
        .into_json()?;
    let Some(id) = added["network_id"].as_u64() else {
        bail!("Daemon returned no network id for '{}'", ssid);
    };

    println!("Connecting to '{}'...", ssid);
    ureq::post(&api_url(port, &format!("/networks/{}/connect", id)))
        .call()
        .map_err(daemon_error)?;
    println!("Connection started; check progress with `wifi-manager status`.");

    if save {
        cfg.add_network(network);
        cfg.save()?;
        println!("Credentials saved to config.");
    }

    Ok(())
}

fn cmd_disconnect(port: Option<u16>) -> Result<()> {
    ureq::post(&api_url(port, "/disconnect"))
        .call()
        .map_err(daemon_error)?;
    println!("Disconnecting.");
    Ok(())
}

fn cmd_mode(mode: RadioMode, port: Option<u16>) -> Result<()> {
    ureq::put(&api_url(port, "/mode"))
        .send_json(json!({ "mode": mode }))
        .map_err(daemon_error)?;
    println!("Mode change to {:?} requested.", mode);
    Ok(())
}

fn cmd_save_network(ssid: &str, password: Option<String>, hidden: bool) -> Result<()> {
    let mut cfg = Config::load().unwrap_or_default();

    cfg.add_network(NetworkConfig {
        ssid: ssid.to_string(),
        password,
        security: None,
        hidden,
        trusted: true,
    });

    cfg.save()?;

    let path = config::config_path()?;
    println!("Saved network '{}' to {}", ssid, path.display());

    Ok(())
}

fn cmd_show_config() -> Result<()> {
    let path = config::config_path()?;
    println!("Config file: {}", path.display());
    println!();

    let cfg = Config::load()?;

    if let Some(ref iface) = cfg.default_interface {
        println!("Default interface: {}", iface);
    }
    println!("API port:          {}", cfg.settings.api_port);
    println!("Verbose logging:   {}", cfg.settings.verbose_logging);
    println!("Access point SSID: {}", cfg.settings.soft_ap.ssid);
    println!();

    if cfg.networks.is_empty() {
        println!("No saved networks.");
    } else {
        println!("{:<24} {:<10} {:<8} {}", "SSID", "SECURITY", "HIDDEN", "PASSWORD");
        println!("{}", "-".repeat(60));
        for network in &cfg.networks {
            let masked_pw = network
                .password
                .as_ref()
                .map(|p| "*".repeat(p.len().min(12)))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<24} {:<10} {:<8} {}",
                network.ssid,
                format!("{:?}", network.security()),
                network.hidden,
                masked_pw
            );
        }
    }

    Ok(())
}
