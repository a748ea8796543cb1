use std::sync::Arc;

use snafu::{ResultExt, ensure};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::node::{Kind, NodeId};
use super::queue::ActiveQueue;
use super::{Result, Workflow, error};
use crate::action::ActionEnv;

/// Drain the graph from `root`: children are discovered and enqueued as
/// their parents complete, conditionals and leaves execute inline, and
/// everything else executes concurrently with further queue draining.
pub(super) async fn run(
    wf: &Workflow,
    root: NodeId,
    env: Arc<dyn ActionEnv>,
    cancel: CancellationToken,
) -> Result<()> {
    let root = wf.get(&root)?;
    ensure!(root.parents().is_empty(), error::InvalidRootSnafu);

    let mut queue = ActiveQueue::new();
    queue.add(wf, root, &cancel)?;

    // Spawned executions land here; every one of them is awaited before
    // the run returns, so no task outlives it.
    let mut executions: JoinSet<Result<()>> = JoinSet::new();

    while queue.len() > 0 {
        let node = queue.next(&cancel).await?;

        // A conditional must execute inline: its latched outcome decides
        // the child set enumerated below. A leaf executes inline because
        // it contributes nothing further to the queue.
        if node.kind() == Kind::Conditional || node.children().is_empty() {
            node.execute(&env, &cancel).await?;
        } else {
            let node = node.clone();
            let env = env.clone();
            let cancel = cancel.clone();
            executions.spawn(async move { node.execute(&env, &cancel).await });
        }

        // A child shared with other parents is enqueued once; its own
        // fan-in keeps it from readying until every parent is done.
        for child in node.children() {
            if queue.has(&child) {
                continue;
            }
            queue.add(wf, wf.get(&child)?, &cancel)?;
        }
    }

    while let Some(joined) = executions.join_next().await {
        joined.context(error::JoinSnafu)??;
    }

    Ok(())
}
