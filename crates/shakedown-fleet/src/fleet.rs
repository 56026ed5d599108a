//! The fleet registry.

use std::sync::Arc;

use shakedown_core::config::{NodeConfig, Role};
use shakedown_core::error::ConfigError;
use shakedown_exec::{Executor, SshExecutor};
use tracing::info;

use crate::error::Result;
use crate::node::Node;

/// A node together with the executor that reaches it.
///
/// The executor is the node's exclusive command channel; cloning the `Arc`
/// shares the same serialized session.
pub struct FleetNode {
    /// Node identity and topology.
    pub node: Node,
    executor: Arc<dyn Executor>,
}

impl FleetNode {
    /// Pairs a node with an executor.
    #[must_use]
    pub fn new(node: Node, executor: Arc<dyn Executor>) -> Self {
        Self { node, executor }
    }

    /// The command channel to this node.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }

    /// Short node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.node.name
    }
}

/// The set of known nodes, with filtered lookup by capability role.
pub struct Fleet {
    nodes: Vec<FleetNode>,
}

impl Fleet {
    /// Builds a fleet from topology entries, opening an SSH executor per
    /// node.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a hostname does not resolve.
    pub fn connect(configs: &[NodeConfig]) -> std::result::Result<Self, ConfigError> {
        let mut nodes = Vec::with_capacity(configs.len());
        for config in configs {
            let node = Node::from_config(config)?;
            let executor: Arc<dyn Executor> = Arc::new(SshExecutor::new(
                &config.hostname,
                &config.username,
                config.key_path.clone(),
            ));
            info!(node = %node.name, addr = %node.addr, roles = ?node.roles, "registered node");
            nodes.push(FleetNode::new(node, executor));
        }
        Ok(Self { nodes })
    }

    /// Builds a fleet from pre-assembled nodes. Used by tests to inject
    /// scripted executors.
    #[must_use]
    pub fn from_parts(nodes: Vec<FleetNode>) -> Self {
        Self { nodes }
    }

    /// All nodes, in topology order.
    #[must_use]
    pub fn all(&self) -> &[FleetNode] {
        &self.nodes
    }

    /// All nodes carrying the given role, in topology order.
    #[must_use]
    pub fn with_role(&self, role: Role) -> Vec<&FleetNode> {
        self.nodes.iter().filter(|n| n.node.has_role(role)).collect()
    }

    /// The first node carrying the given role.
    #[must_use]
    pub fn first(&self, role: Role) -> Option<&FleetNode> {
        self.nodes.iter().find(|n| n.node.has_role(role))
    }

    /// All nodes carrying every one of the given roles.
    #[must_use]
    pub fn with_all_roles(&self, roles: &[Role]) -> Vec<&FleetNode> {
        self.nodes
            .iter()
            .filter(|n| roles.iter().all(|r| n.node.has_role(*r)))
            .collect()
    }

    /// Number of nodes in the fleet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the fleet is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Applies the one-time single-disk normalization to every data node
    /// configured with exactly one managed disk. See
    /// [`FleetNode::partition_single_disk`].
    pub async fn normalize_single_disks(&mut self) -> Result<()> {
        for fleet_node in &mut self.nodes {
            if fleet_node.node.has_role(Role::StorageData) && fleet_node.node.disks.len() == 1 {
                fleet_node.partition_single_disk().await?;
            }
        }
        Ok(())
    }
}
