//! SMS gateway server entry point.
//!
//! Loads the TOML configuration, applies command-line overrides, starts the
//! [`ServerHost`] and runs until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! smsgate-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Config file [default: platform config dir]
//!   --port <PORT>            Listener port
//!   --bind <ADDR>            Listener bind address
//!   --service-name <NAME>    Name the send service is published under
//!   --secured                Install the authorization gate
//!   --allow-anonymous        Admit anonymous callers when secured
//!   --modem-port <DEVICE>    Serial device of the modem
//!   --baud-rate <BAUD>       Serial line speed
//!   --simulate               Use the simulated modem
//!   --save-config            Write the effective configuration back to --config
//! ```
//!
//! Every option can also be set through the matching `SMSGATE_*` environment
//! variable; command-line values win.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smsgate_core::SendEvent;
use smsgate_server::application::subscribers::NotificationKind;
use smsgate_server::infrastructure::modem::factory_for;
use smsgate_server::infrastructure::storage::config::{
    default_config_path, load_config, save_config, DriverKind, GatewayConfig,
};
use smsgate_server::ServerHost;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Exposes a GSM modem as a network SMS send endpoint.
#[derive(Debug, Parser)]
#[command(name = "smsgate-server", version)]
struct Cli {
    /// Configuration file.  Defaults to `config.toml` in the platform config
    /// directory; a missing file means built-in defaults.
    #[arg(long, env = "SMSGATE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "SMSGATE_PORT")]
    port: Option<u16>,

    #[arg(long = "bind", env = "SMSGATE_BIND")]
    bind_address: Option<String>,

    #[arg(long, env = "SMSGATE_SERVICE_NAME")]
    service_name: Option<String>,

    #[arg(long, env = "SMSGATE_SECURED")]
    secured: bool,

    #[arg(long, env = "SMSGATE_ALLOW_ANONYMOUS")]
    allow_anonymous: bool,

    #[arg(long, env = "SMSGATE_MODEM_PORT")]
    modem_port: Option<String>,

    #[arg(long, env = "SMSGATE_BAUD_RATE")]
    baud_rate: Option<u32>,

    #[arg(long, env = "SMSGATE_SIMULATE")]
    simulate: bool,

    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => default_config_path().context("no --config given"),
        }
    }

    /// Overlays the command-line values on `config`.
    fn apply(&self, mut config: GatewayConfig) -> GatewayConfig {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind_address {
            config.server.bind_address = bind.clone();
        }
        if let Some(name) = &self.service_name {
            config.server.service_name = name.clone();
        }
        if self.secured {
            config.server.secured = true;
        }
        if self.allow_anonymous {
            config.server.allow_anonymous = true;
        }
        if let Some(device) = &self.modem_port {
            config.modem.port = device.clone();
        }
        if let Some(baud) = self.baud_rate {
            config.modem.baud_rate = baud;
        }
        if self.simulate {
            config.modem.driver = DriverKind::Simulated;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path()?;
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let config = cli.apply(config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if cli.save_config {
        save_config(&config_path, &config)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        info!("configuration written to {}", config_path.display());
    }

    info!(
        "SMS gateway starting: service={}, port={}, modem={} ({:?})",
        config.server.service_name, config.server.port, config.modem.port, config.modem.driver
    );

    let factory = factory_for(config.modem.driver);
    let mut host = ServerHost::new(config, factory);
    subscribe_log(&host);

    host.start().context("failed to start the gateway")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, stopping");

    if let Err(e) = host.stop() {
        warn!("{e}");
    }
    Ok(())
}

/// Logs every relayed send notification.
fn subscribe_log(host: &ServerHost) {
    host.subscribe(
        NotificationKind::SendStarting,
        Arc::new(|e: &SendEvent| {
            info!(call_id = %e.call_id, caller = %e.caller, to = %e.destination, "send starting");
        }),
    );
    host.subscribe(
        NotificationKind::SendComplete,
        Arc::new(|e: &SendEvent| {
            info!(call_id = %e.call_id, caller = %e.caller, to = %e.destination, "send complete");
        }),
    );
    host.subscribe(
        NotificationKind::SendFailed,
        Arc::new(|e: &SendEvent| {
            warn!(
                call_id = %e.call_id,
                caller = %e.caller,
                to = %e.destination,
                cause = e.failure_cause().unwrap_or_default(),
                "send failed"
            );
        }),
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
