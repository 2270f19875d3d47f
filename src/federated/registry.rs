//! Node registry.
//!
//! Holds registered nodes in registration order together with the
//! registry's secure-channel codec.

use crate::core::{Error, Result, Timestamp};
use crate::privacy::NoiseInjector;
use crate::secure::{ChannelCodec, XorChannelCodec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque handle to a node's local training data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHandle {
    /// Human-readable source label
    pub source: String,
    /// Number of local samples
    pub sample_count: usize,
}

impl DataHandle {
    /// Create a data handle.
    pub fn new(source: &str, sample_count: usize) -> Self {
        Self {
            source: source.to_string(),
            sample_count,
        }
    }
}

/// A contribution produced by one node in one round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Update {
    /// Contributing node
    pub node_id: String,
    /// Gradient-like vector
    pub gradients: Vec<f64>,
    /// Producer-reported accuracy in [0, 1]
    pub accuracy: f64,
    /// Producer-reported loss
    pub loss: f64,
    /// Samples behind this update
    pub data_size: usize,
    /// Creation time
    pub timestamp: Timestamp,
}

/// Registration request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique node id
    pub id: String,
    /// Model-kind label, forwarded to the trainer
    pub model_kind: String,
    /// Privacy budget
    pub epsilon: f64,
    /// Bound training data, if any
    pub data: Option<DataHandle>,
}

impl NodeSpec {
    /// Create a spec without bound data.
    pub fn new(id: &str, model_kind: &str, epsilon: f64) -> Self {
        Self {
            id: id.to_string(),
            model_kind: model_kind.to_string(),
            epsilon,
            data: None,
        }
    }

    /// Bind training data.
    pub fn with_data(mut self, data: DataHandle) -> Self {
        self.data = Some(data);
        self
    }
}

/// Read-only view of a node handed to the trainer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub model_kind: String,
    /// Noise applied to this node's contributions
    pub privacy: NoiseInjector,
    pub data: Option<DataHandle>,
}

impl NodeDescriptor {
    /// Privacy budget.
    pub fn epsilon(&self) -> f64 {
        self.privacy.epsilon()
    }
}

/// A registered participant.
#[derive(Clone, Debug)]
pub struct Node {
    id: String,
    model_kind: String,
    privacy: NoiseInjector,
    data: Option<DataHandle>,
    history: Vec<Update>,
}

impl Node {
    /// Node id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Model-kind label.
    pub fn model_kind(&self) -> &str {
        &self.model_kind
    }

    /// Privacy budget.
    pub fn epsilon(&self) -> f64 {
        self.privacy.epsilon()
    }

    /// The node's noise injector.
    pub fn privacy(&self) -> &NoiseInjector {
        &self.privacy
    }

    /// Whether training data is bound.
    pub fn has_training_data(&self) -> bool {
        self.data.is_some()
    }

    /// Bound data handle.
    pub fn data(&self) -> Option<&DataHandle> {
        self.data.as_ref()
    }

    /// Past updates, oldest first.
    pub fn history(&self) -> &[Update] {
        &self.history
    }

    /// Snapshot for the trainer.
    pub fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            id: self.id.clone(),
            model_kind: self.model_kind.clone(),
            privacy: self.privacy.clone(),
            data: self.data.clone(),
        }
    }
}

/// Registry of participating nodes.
pub struct NodeRegistry {
    /// Nodes in registration order
    nodes: Vec<Node>,
    /// Id to position in `nodes`
    index: HashMap<String, usize>,
    /// Created on first registration
    channel: Option<Box<dyn ChannelCodec>>,
    delta: f64,
}

impl NodeRegistry {
    /// Create an empty registry whose nodes use the given delta.
    pub fn new(delta: f64) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            channel: None,
            delta,
        }
    }

    /// Register a node. Duplicate ids are rejected and leave the
    /// existing node untouched.
    pub fn register(&mut self, spec: NodeSpec) -> Result<()> {
        if self.index.contains_key(&spec.id) {
            return Err(Error::DuplicateNode(spec.id));
        }
        if spec.id.is_empty() {
            return Err(Error::InvalidConfig("node id must not be empty".into()));
        }

        let privacy = NoiseInjector::new(spec.epsilon, self.delta)?;

        self.index.insert(spec.id.clone(), self.nodes.len());
        self.nodes.push(Node {
            id: spec.id,
            model_kind: spec.model_kind,
            privacy,
            data: spec.data,
            history: Vec::new(),
        });

        if self.channel.is_none() {
            self.channel = Some(Box::new(XorChannelCodec::new(self.nodes.len())));
        }

        Ok(())
    }

    /// Bind (or rebind) training data to a node.
    pub fn bind_training_data(&mut self, node_id: &str, data: DataHandle) -> Result<()> {
        let node = self.get_mut(node_id)?;
        node.data = Some(data);
        Ok(())
    }

    /// All nodes in registration order.
    pub fn all(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a node.
    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    fn get_mut(&mut self, node_id: &str) -> Result<&mut Node> {
        let i = *self
            .index
            .get(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;
        Ok(&mut self.nodes[i])
    }

    /// Append an update to the node's history.
    pub fn record_update(&mut self, update: Update) -> Result<()> {
        let node = self.get_mut(&update.node_id)?;
        node.history.push(update);
        Ok(())
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registered ids in registration order.
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Secure-channel codec, present once a node has registered.
    pub fn channel(&self) -> Option<&dyn ChannelCodec> {
        self.channel.as_deref()
    }

    /// Mutable secure-channel codec.
    pub fn channel_mut(&mut self) -> Option<&mut (dyn ChannelCodec + 'static)> {
        self.channel.as_deref_mut()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(crate::privacy::DEFAULT_DELTA)
    }
}
