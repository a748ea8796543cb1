//! The workflow engine: a DAG of heterogeneous nodes executed in
//! dependency order, with independent branches running concurrently.
//!
//! Nodes live in a single owning arena keyed by id; edges are stored as
//! identifier pairs and resolved through the [`Workflow`] handle. Nodes
//! talk to each other exclusively through per-node ready/done streams.

use std::sync::Arc;

use dashmap::DashMap;
use snafu::OptionExt;
use tokio_util::sync::CancellationToken;

pub mod error;
mod execute;
mod node;
mod predicate;
mod queue;
mod runner;

pub use error::WorkflowError;
pub use node::{Gate, Kind, Node, NodeId, NodeStatus, Signal};
pub use predicate::{Fixed, Predicate, Settled};

use node::Body;

use crate::action::{ActionEnv, Pose};

pub type Result<T> = std::result::Result<T, error::WorkflowError>;

/// Maximum number of children a single node may have. Done streams are
/// sized to this bound so broadcasting never suspends.
pub const MAX_FANOUT: usize = 1000;

/// Owning handle over a workflow graph. Cheap to clone; all clones share
/// the same arena.
#[derive(Clone, Default)]
pub struct Workflow {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    nodes: DashMap<NodeId, Arc<Node>>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry point for the traversal. Roots have no parents and
    /// ready immediately on activation.
    pub fn root(&self, name: &str) -> NodeId {
        self.insert(Node::new(name, Body::Root))
    }

    /// Create a job that sends `device` to `target` once every parent has
    /// finished.
    pub fn job(
        &self,
        parents: &[NodeId],
        name: &str,
        device: &str,
        target: Pose,
    ) -> Result<NodeId> {
        let id = self.insert(Node::new(
            name,
            Body::Job {
                device: device.to_string(),
                target,
            },
        ));
        self.link_all(parents, id)?;
        Ok(id)
    }

    /// Create a decision point. The predicate is evaluated at execution
    /// time and its outcome decides which gated children run.
    pub fn conditional(
        &self,
        parents: &[NodeId],
        name: &str,
        check: impl Predicate + 'static,
    ) -> Result<NodeId> {
        let id = self.insert(Node::new(
            name,
            Body::Conditional {
                check: Arc::new(check),
            },
        ));
        self.link_all(parents, id)?;
        Ok(id)
    }

    /// Create a sink node.
    pub fn terminal(&self, parents: &[NodeId], name: &str) -> Result<NodeId> {
        let id = self.insert(Node::new(name, Body::Terminal));
        self.link_all(parents, id)?;
        Ok(id)
    }

    /// Connect `parent -> child` with the default gate: a conditional
    /// parent gates its declared children on a passing outcome, every
    /// other parent runs them unconditionally.
    pub fn link(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let gate = match self.get(&parent)?.kind() {
            Kind::Conditional => Gate::OnPass,
            _ => Gate::Always,
        };
        self.link_when(parent, child, gate)
    }

    /// Connect `parent -> child` with an explicit gate. Relinking an
    /// existing edge replaces its gate.
    pub fn link_when(&self, parent: NodeId, child: NodeId, gate: Gate) -> Result<()> {
        let parent = self.get(&parent)?;
        let child = self.get(&child)?;
        // Validate both endpoints before touching either, so a rejected
        // link never leaves a dangling half-edge.
        parent.check_add_child(&child)?;
        child.check_add_parent(&parent)?;
        parent.link_child(child.id(), gate);
        child.link_parent(parent.id());
        Ok(())
    }

    pub fn get(&self, id: &NodeId) -> Result<Arc<Node>> {
        self.inner
            .nodes
            .get(id)
            .map(|entry| entry.value().clone())
            .context(error::UnknownNodeSnafu { id: *id })
    }

    /// Execute the graph from `root` to completion.
    pub async fn run(&self, root: NodeId, env: Arc<dyn ActionEnv>) -> Result<()> {
        self.run_cancellable(root, env, CancellationToken::new())
            .await
    }

    /// Execute the graph under a caller-owned cancellation token. All
    /// activation and execution tasks observe the token and return
    /// promptly once it fires.
    pub async fn run_cancellable(
        &self,
        root: NodeId,
        env: Arc<dyn ActionEnv>,
        cancel: CancellationToken,
    ) -> Result<()> {
        runner::run(self, root, env, cancel).await
    }

    fn insert(&self, node: Arc<Node>) -> NodeId {
        let id = node.id();
        self.inner.nodes.insert(id, node);
        id
    }

    fn link_all(&self, parents: &[NodeId], child: NodeId) -> Result<()> {
        for parent in parents {
            self.link(*parent, child)?;
        }
        Ok(())
    }
}
