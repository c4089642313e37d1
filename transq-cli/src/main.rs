// transq-cli/src/main.rs
//
// Entry point for the `transq` binary: parses arguments, initializes logging,
// dispatches to the command implementations and maps the outcome to the
// process exit code (0 when every job succeeded, 1 otherwise).

use std::process;

use clap::Parser;
use transq_cli::output::print_error;
use transq_cli::{logging, run_encoders, run_presets, run_transcode, Cli, Commands};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Transcode(args) => run_transcode(args).map(|summary| summary.failed == 0),
        Commands::Presets => run_presets().map(|()| true),
        Commands::Encoders => run_encoders(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            print_error(&format!("Error: {:#}", e));
            process::exit(1);
        }
    }
}
