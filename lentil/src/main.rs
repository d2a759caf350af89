use clap::{Parser, Subcommand};
use lentil::run_sge_by_hexagon::*;

/// Spatial binning of sequencing-based spatial transcriptomics data
#[derive(Parser, Debug)]
#[command(version, about, long_about, term_width = 80)]
struct Cli {
    /// show progress messages
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate pixel-level counts into hexagons over sliding offsets
    #[command(alias = "hexagon")]
    SgeByHexagon(SgeByHexagonArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::SgeByHexagon(args) => {
            run_sge_by_hexagon(args)?;
        }
    }

    Ok(())
}
