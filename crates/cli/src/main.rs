mod commands;

use clap::{Parser, Subcommand};
use commands::common::GlobalArgs;

#[derive(Parser)]
#[command(name = "harvest", about = "Reward bundle builder and Safe proposer")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, estimate and save a bundle; optionally propose it.
    Build(commands::build::BuildArgs),
    /// Propose a saved multisig bundle to the Safe Transaction Service.
    Propose(commands::propose::ProposeArgs),
    /// Add an owner confirmation to an existing proposal.
    Confirm(commands::confirm::ConfirmArgs),
    /// Recompute the Safe digest for a saved multisig bundle (offline).
    Digest(commands::digest::DigestArgs),
    /// Broadcast a saved direct bundle.
    Send(commands::send::SendArgs),
    /// Summarize a saved bundle or a proposal's status.
    Inspect(commands::inspect::InspectArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let global = cli.global;
    let outcome = match cli.command {
        Commands::Build(args) => commands::build::run(&global, args),
        Commands::Propose(args) => commands::propose::run(&global, args),
        Commands::Confirm(args) => commands::confirm::run(&global, args),
        Commands::Digest(args) => commands::digest::run(&global, args),
        Commands::Send(args) => commands::send::run(&global, args),
        Commands::Inspect(args) => commands::inspect::run(&global, args),
    };
    if let Err(err) = outcome {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
