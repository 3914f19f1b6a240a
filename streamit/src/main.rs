use anyhow::Result;
use clap::Parser;

use streamit::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (log_path, _guard) = streamit::logging::init_logging()?;
    tracing::info!(log = %log_path.display(), command = ?cli.command(), "StreamIt starting");

    match cli.command() {
        Command::Login => streamit::login().await?,
        Command::Logout => streamit::logout()?,
        Command::Status => streamit::status().await?,
    }

    Ok(())
}
