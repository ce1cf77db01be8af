use std::net::IpAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use sync_engine::EngineConfig;

#[derive(Parser)]
#[command(name = "sync-server", about = "Concurrent batch sync service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Port for the HTTP API.
    #[arg(long, default_value_t = 8080, env = "SYNC_PORT")]
    pub port: u16,

    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Seconds in-flight requests may drain after SIGINT/SIGTERM.
    #[arg(long, default_value_t = 5)]
    pub grace_period_secs: u64,

    /// Worker tasks per pool. Defaults to the number of CPUs.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Largest accepted batch; larger requests get 413.
    #[arg(long, default_value_t = 1024)]
    pub max_batch_size: usize,
}

impl ServeArgs {
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            workers: self.workers.unwrap_or(defaults.workers),
            max_batch_size: self.max_batch_size,
            grace_period: Duration::from_secs(self.grace_period_secs),
        }
    }
}
