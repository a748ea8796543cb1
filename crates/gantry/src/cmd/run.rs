use std::sync::Arc;

use clap::Parser;
use gantry_core::action::{ActionEnv, Pose};
use gantry_core::config::Config;
use gantry_core::state::FleetState;
use gantry_core::workflow::{Gate, Settled, Workflow};
use snafu::ensure;
use tracing::info;

use crate::{Args, Result, error};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Execute the demo workflow against the fleet", long_about = None)]
pub struct Run {
    /// Target x coordinate for every dispatched robot.
    #[clap(long, default_value_t = 10.0)]
    x: f64,
    /// Target y coordinate for every dispatched robot.
    #[clap(long, default_value_t = 10.0)]
    y: f64,
}

impl Run {
    pub async fn run(&self, args: Args) -> Result<()> {
        let config = Config::load(args.config).await?;
        let robots = config.fleet.robots.clone();
        ensure!(!robots.is_empty(), error::NoRobotsSnafu);

        let cancel = super::shutdown_token();
        let env: Arc<dyn ActionEnv> = Arc::new(FleetState::spawn(&config, &cancel));

        let target = Pose {
            x: self.x,
            y: self.y,
        };
        let device = |i: usize| robots[i % robots.len()].as_str();

        let wf = Workflow::new();
        let root = wf.root("Start");
        let a = wf.job(&[root], "A", device(0), target)?;
        let b = wf.job(&[root], "B", device(1), target)?;
        let c = wf.job(&[a, b], "C", device(2), target)?;
        let d = wf.conditional(&[c], "Fleet settled", Settled::new(&robots, target))?;
        let t1 = wf.terminal(&[d], "Ending One")?;
        let t2 = wf.terminal(&[d], "Ending Two")?;
        // Ending One is the pass branch; Ending Two picks up the rest.
        wf.link_when(d, t2, Gate::OnFail)?;

        for id in [root, a, b, c, d, t1, t2] {
            println!("{} -> {}", wf.get(&id)?.name(), id);
        }

        wf.run_cancellable(root, env, cancel).await?;
        info!("workflow graph is complete");
        Ok(())
    }
}
