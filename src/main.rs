//! etrade-runner - runs a local etrade server and drives the
//! authorization flow against it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use etrade_runner::config::{customer_id_from_env, ConfigLoader};
use etrade_runner::display;
use etrade_runner::flow::{execute, ApiClient, ConsolePrompt};
use etrade_runner::server::{ServerCommand, ServerSupervisor};

/// Exit code for missing or invalid configuration.
const EXIT_CONFIG: i32 = 2;
/// Exit code for all other failures.
const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(
    name = "etrade-runner",
    about = "Runs a local etrade server and drives the authorization flow",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a config file (overrides the default search).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server, authorize, and print the account list.
    Run {
        /// Override the server binary.
        #[arg(long)]
        binary: Option<String>,
        /// Override the server listen address.
        #[arg(long)]
        addr: Option<String>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> i32 {
    let loader = match cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            return EXIT_CONFIG;
        }
    };

    let Commands::Run { binary, addr } = cli.command;
    if let Some(binary) = binary {
        config.server.binary = binary;
    }
    if let Some(addr) = addr {
        config.server.addr = addr;
    }

    // Validate everything before launching anything.
    let customer = match customer_id_from_env() {
        Ok(customer) => customer,
        Err(e) => {
            display::print_error(&e.to_string());
            return EXIT_CONFIG;
        }
    };
    let base_url = match config.http.base_url() {
        Ok(url) => url,
        Err(e) => {
            display::print_error(&e.to_string());
            return EXIT_CONFIG;
        }
    };

    let command = ServerCommand::new(&config.server.binary, &config.server.addr);
    let mut supervisor =
        ServerSupervisor::new(command).with_shutdown_timeout(config.server.shutdown_timeout());

    if let Err(e) = supervisor.start() {
        display::print_error(&format!("failed to start server: {e}"));
        return EXIT_FAILURE;
    }

    let client = ApiClient::new(base_url, config.http.request_timeout());
    let mut prompt = ConsolePrompt;

    match execute(
        &mut supervisor,
        &client,
        &customer,
        &mut prompt,
        config.http.ready_attempts,
    )
    .await
    {
        Ok(accounts) => {
            println!("{accounts}");
            0
        }
        Err(e) => {
            display::print_error(&e.to_string());
            EXIT_FAILURE
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    std::process::exit(run(cli).await);
}
