mod browser;
mod cli;
mod console;
mod error;
mod logging;
mod model;
mod orchestrator;
mod reaper;
mod supervisor;
mod text_summary;

use clap::Parser;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    let log_path = logging::init(args.log_file.as_deref());

    match cli::run(args, log_path).await {
        // Exit explicitly: the stdin reader thread may still be blocked on a read.
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
