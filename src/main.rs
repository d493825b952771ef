//! rax-share - Entry Point
//!
//! One directory, five protocols. Without a subcommand this process is the
//! supervisor; `listener` runs a single protocol and is what the supervisor
//! starts for each enabled one.

use clap::Parser;
use log::{error, info};
use std::process;

use rax_share::cli::{Cli, Command, RunArgs};
use rax_share::config::{LogConfig, ServiceConfig};
use rax_share::error::handlers::{EXIT_CONFIG, EXIT_LISTENER_FAILED};
use rax_share::supervisor::{Supervisor, run_child};
use rax_share::utils::logging::{self, LOG_SPEC_ENV};

fn main() {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            process::exit(EXIT_LISTENER_FAILED);
        }
    };

    let code = match cli.command {
        Some(Command::Listener(args)) => {
            let spec = std::env::var(LOG_SPEC_ENV)
                .unwrap_or_else(|_| logging::filter_spec(&LogConfig::default(), cli.verbose));
            logging::init(&spec);
            runtime.block_on(run_child(args.to_config(), args.supervised))
        }
        None => runtime.block_on(supervise(&cli.run, cli.verbose)),
    };

    // Exit without waiting on blocked stdin readers in the runtime.
    process::exit(code);
}

async fn supervise(args: &RunArgs, verbose: u8) -> i32 {
    let mut config = match ServiceConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };
    args.apply(&mut config);

    let spec = logging::filter_spec(&config.log, verbose);
    logging::init(&spec);

    info!("Launching share supervisor...");

    let mut supervisor = match Supervisor::configure(&config, &spec) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("{}", e);
            return EXIT_CONFIG;
        }
    };

    match supervisor.run().await {
        Ok(summary) => {
            info!(
                "Supervisor exiting: {} started, {} failed",
                summary.started.len(),
                summary.failed.len()
            );
            summary.exit_code()
        }
        Err(e) => {
            error!("{}", e);
            EXIT_LISTENER_FAILED
        }
    }
}
