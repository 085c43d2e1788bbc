//! `a3s-reaper version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("a3s-reaper version {}", a3s_reaper_core::VERSION);
    Ok(())
}
