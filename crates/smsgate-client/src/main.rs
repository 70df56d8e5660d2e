//! `smsgate-send`: sends one short message through an SMS gateway.
//!
//! ```text
//! smsgate-send [OPTIONS] <DESTINATION> <MESSAGE>
//!
//! Options:
//!   --server <ADDR>      Gateway address [default: 127.0.0.1:2000]
//!   --service <NAME>     Published service name [default: SMSSender]
//!   --identity <NAME>    Principal presented to the gateway
//!   --unicode            Encode the message as UCS-2
//! ```

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use smsgate_client::GatewayClient;

/// Sends one SMS through a running smsgate-server.
#[derive(Debug, Parser)]
#[command(name = "smsgate-send", version)]
struct Cli {
    /// Gateway address as `host:port`.
    #[arg(long, default_value = "127.0.0.1:2000", env = "SMSGATE_SERVER")]
    server: String,

    #[arg(long, default_value = "SMSSender", env = "SMSGATE_SERVICE")]
    service: String,

    /// Principal name; omit to connect anonymously.
    #[arg(long, env = "SMSGATE_IDENTITY")]
    identity: Option<String>,

    /// Use UCS-2 instead of the GSM default alphabet.
    #[arg(long)]
    unicode: bool,

    /// Recipient number, e.g. `+491701234567`.
    destination: String,

    message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut client = GatewayClient::connect(cli.server.as_str(), &cli.service, cli.identity.as_deref())
        .await
        .with_context(|| format!("cannot open a session on {} at {}", cli.service, cli.server))?;

    client
        .send_message(&cli.message, &cli.destination, cli.unicode)
        .await
        .with_context(|| format!("sending to {} failed", cli.destination))?;
    info!("message to {} sent", cli.destination);

    client.close().await.context("failed to close the session")?;
    println!("sent");
    Ok(())
}
