use anyhow::Result;
use clap::Parser;
use raggen_tui::cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_text = args.text;

    match cli::run(args).await {
        Ok(()) => {
            // A task left running after quitting must not keep the process alive.
            if !is_text {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}
