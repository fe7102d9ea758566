mod cli;
mod config;
mod error;
mod migrate;
mod model;
mod providers;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    util::tracing_init::init_tracing(if cli.debug { "debug" } else { "info" });

    cli::run(cli).await
}
