mod cli;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    iss_bonds::app::run(cli.boardgroups).await?;
    Ok(())
}
