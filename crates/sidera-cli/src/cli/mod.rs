mod commands;
mod synthetic;

use clap::Parser;

pub fn run_from_env() -> i32 {
    match Cli::try_parse() {
        Ok(cli) => match dispatch_parsed(cli.command) {
            Ok(code) => code,
            Err(error) => {
                eprintln!("Error: {error:#}");
                1
            }
        },
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                0
            }
            _ => {
                eprintln!("{err}");
                2
            }
        },
    }
}

fn dispatch_parsed(command: CliCommand) -> anyhow::Result<i32> {
    match command {
        CliCommand::Synth(args) => commands::run_synth(args),
    }
}

#[derive(Parser)]
#[command(name = "sidera", about = "Stellar template construction engine")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Build a median stellar template from a synthetic observation set
    Synth(commands::SynthArgs),
}
