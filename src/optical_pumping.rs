//! Run optical pumping simulations from TOML configuration files:
//! ```sh
//! optical_pumping run configs/k37_d1.toml -o output/k37_d1.npz
//! optical_pumping check configs/k37_d1.toml
//! ```

use std::path::PathBuf;
use anyhow::Context;
use clap::{ Parser, Subcommand };
use log::LevelFilter;
use optical_pumping::{
    println_flush,
    config::OpConfig,
    simulation::Simulation,
};

#[derive(Parser)]
#[command(name = "optical_pumping")]
#[command(about = "Rate-equation optical pumping of alkali atoms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation and write its trajectory to a .npz file.
    Run {
        /// Path to the run configuration.
        config: PathBuf,
        /// Output file (overrides `out_file`).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration and print it with all defaults filled in.
    Check {
        /// Path to the run configuration.
        config: PathBuf,
    },
}

fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

// RUST_LOG, when set, takes precedence over the configured verbosity
fn init_logging(verbosity: u8) {
    env_logger::Builder::new()
        .filter_level(level_filter(verbosity))
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            let op = OpConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            init_logging(op.verbosity);
            let mut sim = Simulation::from_config(&op)?;
            let traj = sim.run()?;
            let outfile = output.unwrap_or_else(|| op.out_file.clone());
            traj.write_npz(&outfile)
                .with_context(|| format!("writing {}", outfile.display()))?;
            let last = traj.time.len().saturating_sub(1);
            println_flush!(
                "t = {} ns: P = {:.6}, T = {:.6}",
                traj.time[last], traj.polarization[last], traj.alignment[last],
            );
            println_flush!("wrote {}", outfile.display());
            Ok(())
        },
        Commands::Check { config } => {
            let op = OpConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            init_logging(op.verbosity);
            Simulation::from_config(&op)?;
            print!("{}", op.to_toml_string()?);
            println_flush!("# {}: ok", config.display());
            Ok(())
        },
    }
}
