use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::predicate::Predicate;
use super::{MAX_FANOUT, Result, Workflow, error};
use crate::action::Pose;

pub type NodeId = Uuid;

/// Cross-node dependency signal: which node finished, and whether its
/// action passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signal {
    pub id: NodeId,
    pub pass: bool,
}

/// Branch gate carried by an outgoing edge, evaluated against the parent
/// conditional's latched outcome. Edges out of non-conditional nodes are
/// always `Always`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Gate {
    #[default]
    Always,
    OnPass,
    OnFail,
}

impl Gate {
    pub fn admits(&self, pass: bool) -> bool {
        match self {
            Gate::Always => true,
            Gate::OnPass => pass,
            Gate::OnFail => !pass,
        }
    }
}

/// The four node variants composing a workflow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Root,
    Job,
    Conditional,
    Terminal,
}

pub(super) enum Body {
    Root,
    Job { device: String, target: Pose },
    Conditional { check: Arc<dyn Predicate> },
    Terminal,
}

impl Body {
    fn kind(&self) -> Kind {
        match self {
            Body::Root => Kind::Root,
            Body::Job { .. } => Kind::Job,
            Body::Conditional { .. } => Kind::Conditional,
            Body::Terminal => Kind::Terminal,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeStatus {
    Pending = 0,
    Queued = 1,
    Activated = 2,
    Executed = 3,
}

impl From<u8> for NodeStatus {
    fn from(value: u8) -> Self {
        match value {
            x if x == NodeStatus::Pending as u8 => NodeStatus::Pending,
            x if x == NodeStatus::Queued as u8 => NodeStatus::Queued,
            x if x == NodeStatus::Activated as u8 => NodeStatus::Activated,
            x if x == NodeStatus::Executed as u8 => NodeStatus::Executed,
            _ => NodeStatus::Executed,
        }
    }
}

#[derive(Default)]
struct Links {
    parents: IndexSet<NodeId>,
    children: IndexMap<NodeId, Gate>,
}

/// A single node of the graph. Owned by the workflow arena; edges are
/// stored as identifiers and resolved through the workflow handle, so
/// parents and children never hold references to each other.
pub struct Node {
    id: NodeId,
    name: String,
    body: Body,
    status: AtomicU8,
    outcome: AtomicBool,
    links: Mutex<Links>,

    // Means to communicate with other nodes. The ready receiver is
    // claimed once by the active queue's forwarder; the done receiver is
    // shared by the fan-in watchers of every child.
    ready_tx: mpsc::Sender<Signal>,
    ready_rx: Mutex<Option<mpsc::Receiver<Signal>>>,
    done_tx: mpsc::Sender<Signal>,
    done_rx: AsyncMutex<mpsc::Receiver<Signal>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status.load(Ordering::Relaxed))
            .finish()
    }
}

impl Node {
    pub(super) fn new(name: &str, body: Body) -> Arc<Self> {
        let (ready_tx, ready_rx) = mpsc::channel(1);
        // A terminal is a sink: it emits a single done for symmetry even
        // though nothing listens.
        let done_capacity = match body {
            Body::Terminal => 1,
            _ => MAX_FANOUT,
        };
        let (done_tx, done_rx) = mpsc::channel(done_capacity);
        Arc::new(Self {
            id: Uuid::now_v7(),
            name: name.to_string(),
            body,
            status: AtomicU8::new(NodeStatus::Pending as u8),
            outcome: AtomicBool::new(false),
            links: Mutex::new(Links::default()),
            ready_tx,
            ready_rx: Mutex::new(Some(ready_rx)),
            done_tx,
            done_rx: AsyncMutex::new(done_rx),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.body.kind()
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from(self.status.load(Ordering::SeqCst))
    }

    pub fn parents(&self) -> Vec<NodeId> {
        self.links.lock().parents.iter().copied().collect()
    }

    /// The effective child set. For an executed conditional this is the
    /// ids whose gate admits the latched outcome; for everything else
    /// (including a conditional that has not run yet) it is every edge.
    pub fn children(&self) -> Vec<NodeId> {
        let links = self.links.lock();
        if self.kind() == Kind::Conditional && self.status() == NodeStatus::Executed {
            let pass = self.outcome.load(Ordering::SeqCst);
            links
                .children
                .iter()
                .filter(|(_, gate)| gate.admits(pass))
                .map(|(id, _)| *id)
                .collect()
        } else {
            links.children.keys().copied().collect()
        }
    }

    /// Number of declared edges, gated or not. Done signals are broadcast
    /// once per edge so a gated-out child reachable through another parent
    /// can still satisfy its fan-in.
    pub(super) fn fanout(&self) -> usize {
        self.links.lock().children.len()
    }

    pub(super) fn body(&self) -> &Body {
        &self.body
    }

    pub(super) fn latch(&self, pass: bool) {
        self.outcome.store(pass, Ordering::SeqCst);
    }

    pub(super) fn set_activated(&self) {
        self.status
            .store(NodeStatus::Activated as u8, Ordering::SeqCst);
    }

    pub(super) fn set_executed(&self) {
        self.status
            .store(NodeStatus::Executed as u8, Ordering::SeqCst);
    }

    fn begin_activation(&self) -> bool {
        self.status
            .compare_exchange(
                NodeStatus::Pending as u8,
                NodeStatus::Queued as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub(super) fn check_add_child(&self, child: &Node) -> Result<()> {
        ensure!(
            self.kind() != Kind::Terminal,
            error::InvalidEdgeSnafu {
                parent: self.id,
                child: child.id,
                reason: "terminal cannot have any child",
            }
        );
        ensure!(
            child.kind() != Kind::Root,
            error::InvalidEdgeSnafu {
                parent: self.id,
                child: child.id,
                reason: "root cannot be a child",
            }
        );
        ensure!(
            self.status() == NodeStatus::Pending,
            error::GraphLockedSnafu { id: self.id }
        );
        let links = self.links.lock();
        // Replacing the gate on an existing edge does not grow the fanout.
        ensure!(
            links.children.len() < MAX_FANOUT || links.children.contains_key(&child.id),
            error::FanoutExceededSnafu {
                id: self.id,
                max: MAX_FANOUT,
            }
        );
        Ok(())
    }

    pub(super) fn check_add_parent(&self, parent: &Node) -> Result<()> {
        ensure!(
            self.kind() != Kind::Root,
            error::InvalidEdgeSnafu {
                parent: parent.id,
                child: self.id,
                reason: "root cannot depend on anything",
            }
        );
        ensure!(
            self.status() == NodeStatus::Pending,
            error::GraphLockedSnafu { id: self.id }
        );
        Ok(())
    }

    pub(super) fn link_child(&self, child: NodeId, gate: Gate) {
        self.links.lock().children.insert(child, gate);
    }

    pub(super) fn link_parent(&self, parent: NodeId) {
        self.links.lock().parents.insert(parent);
    }

    /// Claim the single ready receiver; fails on a second claim.
    pub(super) fn take_ready(&self) -> Result<mpsc::Receiver<Signal>> {
        self.ready_rx
            .lock()
            .take()
            .context(error::ReadyClaimedSnafu { id: self.id })
    }

    /// Take exactly one done signal off this node's stream.
    pub(super) async fn recv_done(&self, cancel: &CancellationToken) -> Result<Signal> {
        let mut rx = self.done_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => error::CancelledSnafu.fail(),
            sig = rx.recv() => sig.context(error::StreamClosedSnafu { stream: "done" }),
        }
    }

    pub(super) fn emit_done(&self, pass: bool) -> Result<()> {
        self.done_tx
            .try_send(Signal { id: self.id, pass })
            .context(error::SignalSnafu)
    }

    /// One done signal per declared edge; capacity covers the full fanout
    /// so this never suspends.
    pub(super) fn broadcast(&self, pass: bool) -> Result<()> {
        for _ in 0..self.fanout() {
            self.emit_done(pass)?;
        }
        Ok(())
    }

    fn emit_ready(&self) {
        let sig = Signal {
            id: self.id,
            pass: true,
        };
        if let Err(e) = self.ready_tx.try_send(sig) {
            error!("node {} failed to emit ready: {e}", self.name);
        }
    }

    /// Begin the readiness watch. Single-shot: a second call is a no-op.
    ///
    /// For every parent a watcher task forwards exactly one done signal
    /// onto a private mux; a collector counts distinct parent ids and
    /// emits ready once all of them have reported. Duplicate signals from
    /// one parent are absorbed by the set.
    pub(super) fn activate(
        self: &Arc<Self>,
        wf: &Workflow,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !self.begin_activation() {
            warn!("node {} was already activated", self.name);
            return Ok(());
        }
        let parents = self
            .parents()
            .into_iter()
            .map(|id| wf.get(&id))
            .collect::<Result<Vec<_>>>()?;
        if parents.is_empty() {
            // Nothing to wait on: a root readies the moment it activates.
            self.set_activated();
            self.emit_ready();
            return Ok(());
        }

        let expected = parents.len();
        let (mux, mut signals) = mpsc::channel(expected);
        for parent in parents {
            let mux = mux.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Ok(sig) = parent.recv_done(&cancel).await {
                    let _ = mux.send(sig).await;
                }
            });
        }
        drop(mux);

        let node = self.clone();
        tokio::spawn(async move {
            let mut met: HashSet<NodeId> = HashSet::new();
            while let Some(sig) = signals.recv().await {
                met.insert(sig.id);
                if met.len() == expected {
                    node.set_activated();
                    node.emit_ready();
                    return;
                }
            }
            // All watchers bailed out before the fan-in completed; this
            // only happens when the run is being cancelled.
        });
        Ok(())
    }
}
