use std::net::{SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sendme_core::{HashFormat, RelaySetting, Settings, Ticket, TicketType};
use sendme_net::EndpointConfig;
use tracing_subscriber::EnvFilter;

mod display;
mod receive;
mod send;

/// Send a file or directory between two machines, using blake3 verified
/// streaming.
#[derive(Parser, Debug)]
#[command(name = "sendme", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Share a file or directory and print a ticket for it.
    Send(SendArgs),
    /// Fetch the content named by a ticket into the current directory.
    Receive(ReceiveArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// How hashes are printed
    #[arg(long)]
    format: Option<HashFormat>,

    /// `disabled`, `default`, or a comma separated list of relay urls
    #[arg(long)]
    relay: Option<RelaySetting>,

    /// IPv4 socket to bind, e.g. 0.0.0.0:4433
    #[arg(long)]
    magic_ipv4_addr: Option<SocketAddrV4>,

    /// IPv6 socket to bind
    #[arg(long)]
    magic_ipv6_addr: Option<SocketAddrV6>,

    /// More output; repeat for debug logs
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// File or directory to share
    path: PathBuf,

    /// Which addressing information goes into the ticket
    #[arg(long)]
    ticket_type: Option<TicketType>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ReceiveArgs {
    /// Ticket printed by `sendme send`
    ticket: Ticket,

    #[command(flatten)]
    common: CommonArgs,
}

impl CommonArgs {
    /// Settings from the config file with command line overrides applied.
    fn settings(&self) -> Result<Settings> {
        let dir = std::env::var_os("SENDME_CONFIG_DIR").map(PathBuf::from);
        let mut settings = Settings::load(dir.as_deref()).context("failed to load settings")?;
        if let Some(format) = self.format {
            settings.format = format;
        }
        if let Some(relay) = &self.relay {
            settings.relay = relay.clone();
        }
        Ok(settings)
    }

    /// `base` with the identity and bind addresses from the environment and
    /// command line.
    fn endpoint_config(&self, base: EndpointConfig) -> Result<EndpointConfig> {
        let secret = std::env::var("IROH_SECRET").ok();
        let secret_key = sendme_core::identity::get_or_create_secret(secret.as_deref(), self.verbose > 0)
            .context("invalid IROH_SECRET")?;
        Ok(EndpointConfig {
            secret_key: Some(secret_key),
            bind_addr_v4: self.magic_ipv4_addr,
            bind_addr_v6: self.magic_ipv6_addr,
            ..base
        })
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        };
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => {
            init_logging(args.common.verbose);
            send::run(args).await
        }
        Command::Receive(args) => {
            init_logging(args.common.verbose);
            receive::run(args).await
        }
    }
}
