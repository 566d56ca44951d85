//! In-memory transport for unit tests.

use async_trait::async_trait;
use statecast_env::{EnvError, FrameEnvelope, NetworkTransport, NodeId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

type Inboxes = Arc<Mutex<HashMap<NodeId, VecDeque<(NodeId, FrameEnvelope)>>>>;

/// Every node sees every broadcast, in order, with no loss.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inboxes: Inboxes,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, id: NodeId) -> Arc<LoopbackNet> {
        self.inboxes.lock().unwrap().entry(id).or_default();
        Arc::new(LoopbackNet {
            id,
            inboxes: Arc::clone(&self.inboxes),
        })
    }

    /// Puts a frame straight into a node's inbox.
    pub fn inject(&self, to: NodeId, from: NodeId, frame: FrameEnvelope) {
        self.inboxes
            .lock()
            .unwrap()
            .entry(to)
            .or_default()
            .push_back((from, frame));
    }
}

pub struct LoopbackNet {
    id: NodeId,
    inboxes: Inboxes,
}

#[async_trait]
impl NetworkTransport for LoopbackNet {
    async fn send(&self, target: NodeId, frame: FrameEnvelope) -> Result<(), EnvError> {
        let mut inboxes = self.inboxes.lock().unwrap();
        let inbox = inboxes.get_mut(&target).ok_or_else(|| EnvError::unreachable(target))?;
        inbox.push_back((self.id, frame));
        Ok(())
    }

    async fn broadcast(&self, frame: FrameEnvelope) -> usize {
        let mut inboxes = self.inboxes.lock().unwrap();
        let mut count = 0;
        for (id, inbox) in inboxes.iter_mut() {
            if *id != self.id {
                inbox.push_back((self.id, frame.clone()));
                count += 1;
            }
        }
        count
    }

    fn try_recv(&self) -> Option<(NodeId, FrameEnvelope)> {
        self.inboxes.lock().unwrap().get_mut(&self.id)?.pop_front()
    }

    fn local_id(&self) -> NodeId {
        self.id
    }
}
