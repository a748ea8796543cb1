use clap::Parser;
use cmd::{Run, Serve};
use std::path::PathBuf;

mod cmd;

pub type Result<T> = std::result::Result<T, error::Error>;

pub mod error {
    use snafu::Snafu;

    #[derive(Snafu, Debug)]
    #[snafu(visibility(pub))]
    pub enum Error {
        #[snafu(display("no robots configured, nothing to dispatch"))]
        NoRobots,
        #[snafu(transparent)]
        Config {
            source: gantry_core::config::ConfigError,
        },
        #[snafu(transparent)]
        Fleet {
            source: gantry_core::fleet::FleetError,
        },
        #[snafu(transparent)]
        Workflow {
            source: gantry_core::workflow::WorkflowError,
        },
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Workflow engine that coordinates robot fleets", long_about = None)]
pub struct Args {
    #[arg(short, long, default_value = "false")]
    debug: bool,
    #[arg(short, long, default_value = "false")]
    trace: bool,
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug, Clone)]
enum Commands {
    Serve(Serve),
    Run(Run),
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    let args = Args::parse();
    cmd::init_logging(&args);

    match args.clone().command {
        Commands::Serve(cmd) => cmd.run(args.clone()).await?,
        Commands::Run(cmd) => cmd.run(args.clone()).await?,
    }
    Ok(())
}
