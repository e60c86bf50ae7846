mod auth;
mod cli;
mod config;
mod error;
mod governor;
mod output;
mod providers;
mod refs_file;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting gl-create-refs");
    cli.execute().await?;

    Ok(())
}
