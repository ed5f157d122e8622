//! fleetgen — fleet provisioning entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse the command line
//!   3. Load config
//!   4. Init logger at the resolved level
//!   5. Run the subcommand

use clap::Parser;

use fleetgen::{
    cli::{self, Cli},
    config,
    error::FleetError,
    logger,
    observer::TracingObserver,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), FleetError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = Cli::parse();
    let config = config::load(args.config.as_deref())?;

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    logger::parse_level(level)?;
    logger::init(level)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli::run(args.command, &config, &TracingObserver, &mut out)
}
