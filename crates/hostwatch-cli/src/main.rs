//! CLI for hostwatch: ports, foreign connections, GPUs, energy cost and
//! training jobs on one machine.

mod commands;
mod tui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hostwatch")]
#[command(about = "hostwatch: host telemetry for GPU training boxes")]
#[command(version = hostwatch_core::VERSION)]
struct Cli {
    /// JSON config file (defaults apply to any missing key)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listening ports, established connections and foreign peers
    Ports {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Fall back per protocol instead of switching both protocols to the
        /// secondary tool when the primary fails
        #[arg(long)]
        per_protocol: bool,
    },

    /// CPU, RAM, disk and GPU snapshot
    System {
        #[arg(long)]
        json: bool,
    },

    /// Power draw and electricity cost estimate
    Energy {
        /// Electricity price per kWh for this run
        #[arg(long)]
        price: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Detected training jobs, or stop/pause/resume one
    Training {
        #[command(subcommand)]
        action: Option<TrainingAction>,

        #[arg(long)]
        json: bool,
    },

    /// Print a full report as one JSON line every interval (Ctrl+C to stop)
    Stream {
        /// Seconds between reports
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,

        /// Stop after this many reports (0 = until Ctrl+C)
        #[arg(long, default_value_t = 0)]
        count: usize,
    },

    /// Live dashboard (TUI)
    Monitor {
        /// Refresh rate in seconds
        #[arg(long, default_value = "2.0")]
        refresh: f64,
    },

    /// Start the HTTP and WebSocket API
    Server {
        #[arg(long, default_value = "1571")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[derive(Subcommand)]
enum TrainingAction {
    /// Send SIGTERM to a tracked job
    Stop { pid: u32 },
    /// Send SIGSTOP to a tracked job
    Pause { pid: u32 },
    /// Send SIGCONT to a tracked job
    Resume { pid: u32 },
}

fn main() {
    let cli = Cli::parse();

    // Log lines on stderr would tear the dashboard.
    let default_filter = match cli.command {
        Commands::Monitor { .. } => "off",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = commands::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Ports { json, per_protocol } => commands::ports::run(config, json, per_protocol),
        Commands::System { json } => commands::system::run(config, json),
        Commands::Energy { price, json } => commands::energy::run(config, price, json),
        Commands::Training { action, json } => match action {
            None => commands::training::run(config, json),
            Some(TrainingAction::Stop { pid }) => {
                commands::training::control(config, pid, hostwatch_core::JobAction::Stop)
            }
            Some(TrainingAction::Pause { pid }) => {
                commands::training::control(config, pid, hostwatch_core::JobAction::Pause)
            }
            Some(TrainingAction::Resume { pid }) => {
                commands::training::control(config, pid, hostwatch_core::JobAction::Resume)
            }
        },
        Commands::Stream { interval, count } => commands::stream::run(config, interval, count),
        Commands::Monitor { refresh } => commands::monitor::run(config, refresh),
        Commands::Server { port, host } => commands::server::run(config, &host, port),
    }
}
