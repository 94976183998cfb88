//! lcdsrv daemon
//!
//! Serves a character LCD on the local I2C bus to TCP or Unix socket clients.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lcdsrv::config::{default_config_path, Config, DisplayBackend, ListenMode};
use lcdsrv::gateway::{Listener, Multiplexer};
use lcdsrv::{bus, logging, systemd, DisplayEncoder, PidFile};

/// lcdsrv - network gateway for I2C character LCDs.
#[derive(Parser, Debug)]
#[command(name = "lcdsrv")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// PID file path
    #[arg(short, long, value_name = "FILE")]
    pub pidfile: Option<PathBuf>,

    /// Listen on a Unix domain socket at PATH
    #[arg(short, long, value_name = "PATH", conflicts_with = "ip")]
    pub socket: Option<PathBuf>,

    /// Listen on TCP at IP
    #[arg(short, long, value_name = "IP")]
    pub ip: Option<String>,

    /// TCP port
    #[arg(short = 't', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// I2C bus number (/dev/i2c-N)
    #[arg(short, long, value_name = "N")]
    pub bus: Option<u8>,

    /// Log bus traffic instead of driving the display
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Apply command line overrides on top of file and environment values.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.pidfile {
            config.daemon.pid_file = path.clone();
        }
        if let Some(path) = &self.socket {
            config.listen.mode = ListenMode::Unix;
            config.listen.socket_path = path.clone();
        }
        if let Some(ip) = &self.ip {
            config.listen.mode = ListenMode::Tcp;
            config.listen.ip = ip.clone();
        }
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(bus) = self.bus {
            config.display.bus = bus;
        }
        if self.dry_run {
            config.display.backend = DisplayBackend::Trace;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    cli.apply(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    let _log_guard = logging::init(&config.daemon, cli.verbose)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        listen = %config.listen.mode,
        log_level = %config.daemon.log_level,
        backend = ?config.display.backend,
        systemd = systemd::is_systemd(),
        "lcdsrv starting"
    );

    let _pid_file = PidFile::create(&config.daemon.pid_file)?;

    let bus = bus::open(&config.display)?;
    let mut display = DisplayEncoder::new(bus, config.display.address);
    display
        .initialize()
        .context("Failed to initialize the display")?;

    let listener = Listener::bind(&config.listen).await?;
    let endpoint = listener.endpoint();
    let mut gateway = Multiplexer::new(listener, display, config.listen.max_clients);

    systemd::notify_ready();
    systemd::notify_status(&format!("Serving display on {endpoint}"));

    let result = tokio::select! {
        result = gateway.run() => result.map_err(anyhow::Error::from),
        signal = wait_for_shutdown_signal() => signal,
    };

    systemd::notify_stopping();
    let stats = gateway.stats();
    tracing::info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        commands = stats.commands,
        bus_failures = stats.bus_failures,
        "lcdsrv stopped"
    );

    // Listener drop removes the Unix socket; the PID file guard follows.
    drop(gateway);
    result
}

/// Wait for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}
