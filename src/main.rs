//! volc CLI binary entry point.

use clap::Parser;
use volc_ai::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let result = match cli.command {
        Commands::Speak(args) => commands::handle_speak(args).await,
        Commands::Chat(args) => commands::handle_chat(args).await,
        Commands::Image(args) => commands::handle_image(args).await,
        Commands::Models(args) => commands::handle_models(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
