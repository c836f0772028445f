//! Skein CLI: check scripts, fire events, list syntax.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "skein",
    version,
    about = "Trigger scripting engine: pattern-matched syntax over a typed value model"
)]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: skein::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = skein::cli::dispatch(cli.command, cli.verbose) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
