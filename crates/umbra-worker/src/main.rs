//! umbra-worker - one modeling worker process.
//!
//! Invoked by the manager as `umbra-worker <port>`; binds its command
//! channel on loopback at that port and answers `ping` once it is ready to
//! accept commands.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use umbra_worker::{CommandRegistry, serve};

#[derive(Parser, Debug)]
#[command(name = "umbra-worker", about = "Modeling worker process")]
struct Args {
    /// Loopback port to bind the command channel on.
    port: u16,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    serve(args.port, CommandRegistry::with_builtins()).await
}
