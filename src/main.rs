//! marketing-classifiers - main entry point

use clap::Parser;
use marketing_classifiers::cli::{
    cmd_compare, cmd_info, cmd_roc, cmd_select, cmd_tune_ensemble, Cli, Commands,
};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketing_classifiers=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Compare(args) => cmd_compare(args)?,
        Commands::Select(args) => cmd_select(args)?,
        Commands::TuneEnsemble(args) => cmd_tune_ensemble(args)?,
        Commands::Roc(args) => cmd_roc(args)?,
        Commands::Info(args) => cmd_info(args)?,
    }

    Ok(())
}
