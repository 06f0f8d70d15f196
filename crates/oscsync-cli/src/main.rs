//! oscsync - tempo master, slave and control tool
//!
//! # Usage
//!
//! ```text
//! oscsync serve --tempo 128
//! oscsync pulses --host 10.0.0.5 -n 24
//! oscsync tempo 90
//! oscsync slaves
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use oscsync_client::{
    list_slaves, query_tempo, set_tempo, SyncClient, SyncClientConfig, REPLY_TIMEOUT,
};
use oscsync_core::{Pulse, SyncResult, Tempo, MASTER_PORT};
use oscsync_master::{MasterConfig, MasterServer};
use oscsync_transport::resolve;

#[derive(Parser, Debug)]
#[command(name = "oscsync", about = "Tempo synchronization over OSC")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a tempo master.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// UDP port to listen on.
        #[arg(long, default_value_t = MASTER_PORT)]
        port: u16,

        /// Starting tempo in BPM.
        #[arg(long, default_value_t = 120.0)]
        tempo: f32,
    },

    /// Print the master's tempo, or set it when BPM is given.
    Tempo {
        /// Master host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Master port.
        #[arg(long, default_value_t = MASTER_PORT)]
        port: u16,

        /// New tempo in BPM.
        bpm: Option<f32>,
    },

    /// Follow a master as a slave and print pulses.
    Pulses {
        /// Master host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Master port.
        #[arg(long, default_value_t = MASTER_PORT)]
        port: u16,

        /// Host the master should send pulses to.
        #[arg(long, default_value = "127.0.0.1")]
        announce_host: String,

        /// Print every Nth pulse.
        #[arg(short = 'n', default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        every: u64,
    },

    /// List the master's slaves.
    Slaves {
        /// Master host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Master port.
        #[arg(long, default_value_t = MASTER_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,oscsync=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { host, port, tempo } => run_master(host, port, tempo).await,
        Command::Tempo { host, port, bpm } => run_tempo(&host, port, bpm).await,
        Command::Pulses {
            host,
            port,
            announce_host,
            every,
        } => run_slave(host, port, announce_host, every).await,
        Command::Slaves { host, port } => run_slaves(&host, port).await,
    }
}

/// Shutdown channel flipped by Ctrl-C
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });
    shutdown_rx
}

async fn run_master(host: String, port: u16, bpm: f32) -> anyhow::Result<()> {
    let tempo = Tempo::new(bpm).context("invalid starting tempo")?;
    let config = MasterConfig::default()
        .with_listen_host(host)
        .with_port(port)
        .with_tempo(tempo);

    let server = MasterServer::bind(config)
        .await
        .context("failed to bind master socket")?;
    info!(addr = %server.local_addr(), %tempo, "master starting");

    let stats = server.run(shutdown_on_ctrl_c()).await?;
    info!(?stats, "master stopped");
    Ok(())
}

async fn run_tempo(host: &str, port: u16, bpm: Option<f32>) -> anyhow::Result<()> {
    let master = resolve(host, port)
        .await
        .with_context(|| format!("failed to resolve master {}:{}", host, port))?;

    match bpm {
        Some(bpm) => {
            set_tempo(master, bpm).await.context("failed to set tempo")?;
            println!("tempo set to {}", bpm);
        }
        None => {
            let tempo = query_tempo(master, REPLY_TIMEOUT)
                .await
                .context("master did not report its tempo")?;
            println!("{}", tempo);
        }
    }
    Ok(())
}

async fn run_slave(
    host: String,
    port: u16,
    announce_host: String,
    every: u64,
) -> anyhow::Result<()> {
    let config = SyncClientConfig::default()
        .with_master(host, port)
        .with_announce_host(announce_host);

    let handler = move |pulse: Pulse| -> SyncResult<()> {
        if pulse.count.value() % every == 0 {
            println!(
                "{} bar {} pulse {} @ {}",
                pulse.count,
                pulse.count.bar(),
                pulse.count.pulse_in_bar(),
                pulse.tempo
            );
        }
        Ok(())
    };

    let stats = SyncClient::connect(config, handler, shutdown_on_ctrl_c())
        .await
        .context("sync session failed")?;
    info!(?stats, "slave stopped");
    Ok(())
}

async fn run_slaves(host: &str, port: u16) -> anyhow::Result<()> {
    let master = resolve(host, port)
        .await
        .with_context(|| format!("failed to resolve master {}:{}", host, port))?;

    let slaves = list_slaves(master, REPLY_TIMEOUT)
        .await
        .context("master did not list its slaves")?;
    if slaves.is_empty() {
        println!("no slaves");
    }
    for slave in slaves {
        println!("{}", slave);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["oscsync", "serve"]).unwrap();
        match cli.command {
            Command::Serve { host, port, tempo } => {
                assert_eq!(host, "0.0.0.0");
                assert_eq!(port, 5776);
                assert_eq!(tempo, 120.0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_tempo_with_and_without_bpm() {
        let cli =
            Cli::try_parse_from(["oscsync", "tempo", "--host", "10.0.0.5", "96.5"]).unwrap();
        match cli.command {
            Command::Tempo { host, bpm, .. } => {
                assert_eq!(host, "10.0.0.5");
                assert_eq!(bpm, Some(96.5));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["oscsync", "tempo"]).unwrap();
        assert!(matches!(cli.command, Command::Tempo { bpm: None, .. }));
    }

    #[test]
    fn test_pulses_every_defaults_to_each_pulse() {
        let cli = Cli::try_parse_from(["oscsync", "pulses"]).unwrap();
        assert!(matches!(cli.command, Command::Pulses { every: 1, .. }));

        let cli = Cli::try_parse_from(["oscsync", "pulses", "-n", "96"]).unwrap();
        assert!(matches!(cli.command, Command::Pulses { every: 96, .. }));
        assert!(Cli::try_parse_from(["oscsync", "pulses", "-n", "0"]).is_err());
    }
}
