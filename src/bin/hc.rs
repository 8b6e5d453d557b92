//! Command-line entry point: run a horizontal convection simulation or
//! recover the streamfunction from its snapshots.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info};
use simple_logger::SimpleLogger;

use hc_rs::analysis::recover_streamfunction;
use hc_rs::error::{Result, SolverError};
use hc_rs::io::Container;
use hc_rs::parallel::run_workers;
use hc_rs::simulation::{RunConfig, Simulation};

#[derive(Parser)]
#[command(name = "hc", version, about = "Spectral horizontal convection solver")]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Integrate the equations until a stop condition is reached
    Run {
        /// JSON run configuration; defaults are used for missing keys
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of in-process workers
        #[arg(short, long, default_value = "1")]
        workers: usize,
        /// 2 or 3; ignored when a config file is given
        #[arg(short, long, default_value = "2")]
        dim: usize,
    },
    /// Time-average u and w over snapshot containers and solve for psi
    Streamfunction {
        /// Snapshot or 2d_averages containers; 3D records are averaged over y
        #[arg(required = true)]
        containers: Vec<PathBuf>,
        /// Configuration of the run that wrote them (box size)
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "streamfunction")]
        out: PathBuf,
        #[arg(short, long, default_value = "1")]
        workers: usize,
    },
}

fn load_config(path: Option<&PathBuf>, dim: usize) -> Result<RunConfig> {
    match path {
        Some(p) => RunConfig::from_json_file(p),
        None => RunConfig::for_dim(dim),
    }
}

fn run(config: Option<PathBuf>, workers: usize, dim: usize) -> Result<()> {
    let config = load_config(config.as_ref(), dim)?;
    info!("Running with {} worker(s), output in {}", workers, config.output.dir.display());
    let results = run_workers(workers, |comm| Simulation::new(config.clone(), comm)?.run())?;
    for result in results {
        result?;
    }
    Ok(())
}

fn streamfunction(
    containers: Vec<PathBuf>,
    config: Option<PathBuf>,
    out: PathBuf,
    workers: usize,
) -> Result<()> {
    let mut config = load_config(config.as_ref(), 2)?;
    // Resolution comes from the stored axes.
    let first = containers
        .first()
        .ok_or_else(|| SolverError::configuration("no containers given"))?;
    let first = Container::read(first)?;
    let size = |name: &str| {
        first
            .axis(name)
            .map(|g| g.len())
            .ok_or_else(|| SolverError::configuration(format!("container has no '{}' axis", name)))
    };
    config.domain.nx = size("x")?;
    config.domain.nz = size("z")?;

    let results = run_workers(workers, |comm| {
        let domain = std::sync::Arc::new(config.domain.build(2, comm)?);
        recover_streamfunction(&domain, &containers, &out).map(|_| ())
    })?;
    for result in results {
        result?;
    }
    info!("Wrote streamfunction to {}", out.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = SimpleLogger::new().with_level(cli.log_level).init() {
        eprintln!("logger setup failed: {}", e);
    }

    let outcome = match cli.command {
        Command::Run {
            config,
            workers,
            dim,
        } => run(config, workers, dim),
        Command::Streamfunction {
            containers,
            config,
            out,
            workers,
        } => streamfunction(containers, config, out, workers),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
