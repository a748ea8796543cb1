use std::collections::HashMap;
use std::sync::Arc;

use snafu::OptionExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::node::{Node, NodeId, Signal};
use super::{MAX_FANOUT, Result, Workflow, error};

/// First-ready-first-out dispatcher. A node is ready once its fan-in has
/// seen a done signal from every parent; ties between nodes readying
/// together are broken by the multiplexer, not by insertion order.
pub(super) struct ActiveQueue {
    pending: HashMap<NodeId, Arc<Node>>,
    mux_tx: mpsc::Sender<Signal>,
    mux_rx: mpsc::Receiver<Signal>,
}

impl ActiveQueue {
    pub fn new() -> Self {
        let (mux_tx, mux_rx) = mpsc::channel(MAX_FANOUT);
        Self {
            pending: HashMap::new(),
            mux_tx,
            mux_rx,
        }
    }

    /// Insert a node, start its activation watch, and relay its single
    /// ready signal onto the shared endpoint. The relay runs on its own
    /// task so this never blocks the caller.
    pub fn add(
        &mut self,
        wf: &Workflow,
        node: Arc<Node>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut ready = node.take_ready()?;
        self.pending.insert(node.id(), node.clone());
        node.activate(wf, cancel)?;

        let mux = self.mux_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                sig = ready.recv() => {
                    if let Some(sig) = sig {
                        let _ = mux.send(sig).await;
                    }
                }
            }
        });
        Ok(())
    }

    pub fn has(&self, id: &NodeId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Block until some enqueued node signals ready, remove it from the
    /// pending set and return it. A ready signal that does not match any
    /// pending node means the queue has been corrupted; that is fatal.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<Arc<Node>> {
        let sig = tokio::select! {
            _ = cancel.cancelled() => return error::CancelledSnafu.fail(),
            sig = self.mux_rx.recv() => {
                sig.context(error::StreamClosedSnafu { stream: "ready" })?
            }
        };
        self.pending
            .remove(&sig.id)
            .context(error::QueueDesyncSnafu { id: sig.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Workflow;

    #[tokio::test]
    async fn yields_the_root_once_it_readies() {
        let wf = Workflow::new();
        let root = wf.root("start");
        let cancel = CancellationToken::new();

        let mut queue = ActiveQueue::new();
        queue.add(&wf, wf.get(&root).unwrap(), &cancel).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.has(&root));

        let node = queue.next(&cancel).await.unwrap();
        assert_eq!(node.id(), root);
        assert_eq!(queue.len(), 0);
        assert!(!queue.has(&root));
    }

    #[tokio::test]
    async fn next_observes_cancellation() {
        let wf = Workflow::new();
        let root = wf.root("start");
        let a = wf.terminal(&[root], "end").unwrap();
        let cancel = CancellationToken::new();

        let mut queue = ActiveQueue::new();
        // The terminal never readies: its parent never broadcasts done.
        queue.add(&wf, wf.get(&a).unwrap(), &cancel).unwrap();
        cancel.cancel();
        let err = queue.next(&cancel).await.unwrap_err();
        assert!(matches!(err, crate::workflow::WorkflowError::Cancelled));
    }
}
