//! A3S Reaper CLI entry point.

use clap::Parser;

use a3s_reaper_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    a3s_reaper_cli::logging::init(cli.log_format);

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
