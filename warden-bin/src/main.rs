use clap::Parser;
use warden_cli::Cli;

/// Exit status for a malformed operation, distinct from other failures.
const EXIT_INVALID_OPERATION: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        eprintln!("❌ warden: {e}");
        let code = if e.is_fatal_for_evaluation() {
            EXIT_INVALID_OPERATION
        } else {
            1
        };
        std::process::exit(code);
    }
}
