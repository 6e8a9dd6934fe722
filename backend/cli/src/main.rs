mod check_config_cmd;
mod config;
mod engines_cmd;
mod scan_cmd;
mod serve;
mod status_cmd;
mod terminal_output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fleetgate_logging::init_logger;

#[derive(Parser)]
#[command(name = "fleetgate")]
#[command(about = "fleetgate: swarm liveness and fault-tolerant lane routing")]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start discovery, the health ring, and the HTTP gateway
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Sweep a /24 for unlisted nodes, printing one JSON line per node
    Scan {
        /// Range to sweep, e.g. 192.168.1.0/24
        cidr: String,
        /// Concurrent probe workers
        #[arg(short, long, default_value_t = fleetgate_discovery::scanner::DEFAULT_WORKERS)]
        workers: usize,
        /// Per-probe timeout in milliseconds
        #[arg(long, default_value_t = 1500)]
        timeout_ms: u64,
    },
    /// Detect inference engines on localhost and, optionally, a subnet
    Engines {
        #[arg(short, long)]
        subnet: Option<String>,
    },
    /// Validate the config file and print warnings
    CheckConfig,
    /// Query a running gateway
    Status {
        /// Gateway base URL
        #[arg(long, default_value = "http://localhost:18800")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Serve { port } => {
            let fleet = config::load_with_logging(&config_path).await?;
            serve::run_server(fleet, port).await?;
        }
        Commands::Scan {
            cidr,
            workers,
            timeout_ms,
        } => {
            init_logger(None, "warn");
            scan_cmd::run(&cidr, workers, timeout_ms).await?;
        }
        Commands::Engines { subnet } => {
            init_logger(None, "warn");
            engines_cmd::run(subnet.as_deref()).await?;
        }
        Commands::CheckConfig => {
            init_logger(None, "warn");
            check_config_cmd::run(&config_path).await?;
        }
        Commands::Status { url } => {
            init_logger(None, "warn");
            status_cmd::run(&url).await?;
        }
    }

    Ok(())
}
