use clap::Parser;

use shelflife_cli::cli::Cli;
use shelflife_cli::commands;
use shelflife_cli::logging::init_tracing;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_json) {
        eprintln!("{e}");
    }

    if let Err(e) = commands::run(cli).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
