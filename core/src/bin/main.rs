/// blocktick command-line runner
///
/// Loads a script bundle, presses the green flag and ticks the scheduler
/// until the scripts finish, a tick limit is hit, or Ctrl-C.
use blocktick_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
