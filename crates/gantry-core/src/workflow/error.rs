use snafu::Snafu;
use tokio::{sync::mpsc::error::TrySendError, task::JoinError};

use super::node::{NodeId, Signal};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum WorkflowError {
    #[snafu(display("workflow run was cancelled"))]
    Cancelled,
    #[snafu(display("node {id} already has the maximum of {max} children"))]
    FanoutExceeded { id: NodeId, max: usize },
    #[snafu(display("node {id} has been locked down, cannot modify its parents or children"))]
    GraphLocked { id: NodeId },
    #[snafu(display("invalid edge {parent} -> {child}: {reason}"))]
    InvalidEdge {
        parent: NodeId,
        child: NodeId,
        reason: &'static str,
    },
    #[snafu(display("root node cannot have any dependency"))]
    InvalidRoot,
    #[snafu(display("failed to wait for execution tasks: {source}"))]
    Join { source: JoinError },
    #[snafu(display("must activate a node before execution: {id}"))]
    NotActivated { id: NodeId },
    #[snafu(display("ready signal for {id} does not match any pending node"))]
    QueueDesync { id: NodeId },
    #[snafu(display("ready stream for {id} was already claimed"))]
    ReadyClaimed { id: NodeId },
    #[snafu(display("failed to signal node completion: {source}"))]
    Signal { source: TrySendError<Signal> },
    #[snafu(display("{stream} stream closed before a signal arrived"))]
    StreamClosed { stream: &'static str },
    #[snafu(display("no node exists in the workflow with id {id}"))]
    UnknownNode { id: NodeId },
}
