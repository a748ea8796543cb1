use clap::Parser;
use gantry_core::config::Config;
use gantry_core::fleet::{self, Store};

use crate::{Args, Result};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Run the mock fleet server", long_about = None)]
pub struct Serve {}

impl Serve {
    pub async fn run(&self, args: Args) -> Result<()> {
        let config = Config::load(args.config).await?;
        let store = Store::seed(&config.fleet.robots);
        let cancel = super::shutdown_token();
        fleet::serve(&config, store, cancel).await?;
        Ok(())
    }
}
