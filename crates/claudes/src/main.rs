// ABOUTME: claudes CLI entry point
// ABOUTME: Parses arguments, sets up logging and hands off to the library

use clap::Parser;
use claudes::Args;

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // the TUI owns the terminal, so interactive runs log to a file
    if args.headless {
        claudes_log::init();
    } else {
        claudes_log::init_file("claudes");
    }

    if let Err(e) = claudes::run(args).await {
        tracing::error!(error = %e, "claudes exited with an error");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
