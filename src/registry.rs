//! Nodes and the universes they host.
//!
//! A universe can only be created under a node that already exists, and
//! nodes are never removed on their own, so every universe always has a
//! live parent.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use log::info;
use serde::{Deserialize, Serialize};

use crate::models::universe::{Node, Universe};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("parent node {parent_node_id:?} not found for universe {universe_id:?}")]
    UnknownParentNode {
        universe_id: String,
        parent_node_id: String,
    },
    #[error("{0} id must not be empty")]
    EmptyId(&'static str),
    #[error("node {node_id:?} has reached its maximum of {limit} universe(s)")]
    PortLimitReached { node_id: String, limit: usize },
    #[error("universe {0:?} not found")]
    UnknownUniverse(String),
    #[error("universe {universe_id:?} still has {fixtures} fixture(s) patched")]
    UniverseInUse { universe_id: String, fixtures: usize },
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: BTreeMap<String, Node>,
    universes: BTreeMap<String, Universe>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a node. A `universe_count` of 0 means the node
    /// did not report its ports and takes any number of universes.
    pub fn register_node(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        addr: SocketAddrV4,
        universe_count: usize,
    ) -> Result<(), RegistryError> {
        let node = Node {
            id: id.into(),
            name: name.into(),
            addr,
            universe_count,
        };
        if node.id.is_empty() {
            return Err(RegistryError::EmptyId("node"));
        }
        info!(
            "[patchbay::registry] adding node {} ({:?}) at {} with {} universe(s)",
            node.id, node.name, node.addr, node.universe_count
        );
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Insert a universe under `parent_node_id`. Registering an existing
    /// universe again moves it to the new parent and keeps its fixtures.
    ///
    /// A node hosts at most `universe_count` universes; re-registering a
    /// universe under the node it already belongs to does not count twice.
    pub fn register_universe(
        &mut self,
        id: impl Into<String>,
        parent_node_id: &str,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RegistryError::EmptyId("universe"));
        }
        let Some(node) = self.nodes.get(parent_node_id) else {
            return Err(RegistryError::UnknownParentNode {
                universe_id: id,
                parent_node_id: parent_node_id.to_string(),
            });
        };

        let already_attached = self
            .universes
            .get(&id)
            .is_some_and(|u| u.node_id == parent_node_id);
        if !already_attached && node.universe_count > 0 {
            let attached = self
                .universes
                .values()
                .filter(|u| u.node_id == parent_node_id)
                .count();
            if attached >= node.universe_count {
                return Err(RegistryError::PortLimitReached {
                    node_id: parent_node_id.to_string(),
                    limit: node.universe_count,
                });
            }
        }

        info!(
            "[patchbay::registry] adding universe {} under node {}",
            id, parent_node_id
        );
        self.universes
            .entry(id.clone())
            .and_modify(|u| u.node_id = parent_node_id.to_string())
            .or_insert_with(|| Universe {
                id,
                node_id: parent_node_id.to_string(),
                fixtures: Vec::new(),
            });
        Ok(())
    }

    /// Detach a universe from its node and forget it. Universes with
    /// fixtures patched into them are refused.
    pub fn remove_universe(&mut self, id: &str) -> Result<Universe, RegistryError> {
        let universe = self
            .universes
            .get(id)
            .ok_or_else(|| RegistryError::UnknownUniverse(id.to_string()))?;
        if !universe.fixtures.is_empty() {
            return Err(RegistryError::UniverseInUse {
                universe_id: id.to_string(),
                fixtures: universe.fixtures.len(),
            });
        }
        let universe = self
            .universes
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownUniverse(id.to_string()))?;
        info!(
            "[patchbay::registry] removed universe {} from node {}",
            id, universe.node_id
        );
        Ok(universe)
    }

    /// Drop every node and universe.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.universes.clear();
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn universe(&self, id: &str) -> Option<&Universe> {
        self.universes.get(id)
    }

    pub(crate) fn universe_mut(&mut self, id: &str) -> Option<&mut Universe> {
        self.universes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn universes(&self) -> impl Iterator<Item = &Universe> {
        self.universes.values()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            nodes: self
                .nodes
                .values()
                .map(|n| NodeRecord {
                    node_id: n.id.clone(),
                    ip_addr: n.addr.ip().to_string(),
                    port: n.addr.port(),
                    name: Some(n.name.clone()),
                    universe_count: Some(n.universe_count),
                })
                .collect(),
            universes: self
                .universes
                .values()
                .map(|u| UniverseRecord {
                    universe_id: u.id.clone(),
                    parent_node_id: u.node_id.clone(),
                })
                .collect(),
        }
    }

    /// Replace the registry contents with `snapshot`.
    ///
    /// Nodes are loaded before universes. On any error the registry is left
    /// exactly as it was. Restored universes start with no fixtures. Port
    /// limits are not re-checked, since a node may have been re-registered
    /// with fewer ports than it already hosts.
    pub fn restore(&mut self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        let mut nodes = BTreeMap::new();
        for record in &snapshot.nodes {
            let node = record.to_node()?;
            nodes.insert(node.id.clone(), node);
        }

        let mut universes = BTreeMap::new();
        for record in &snapshot.universes {
            if record.universe_id.is_empty() || record.parent_node_id.is_empty() {
                return Err(RegistryError::InvalidSnapshot(format!(
                    "invalid universe data: {record:?}"
                )));
            }
            if !nodes.contains_key(&record.parent_node_id) {
                return Err(RegistryError::InvalidSnapshot(format!(
                    "parent node {} not found for universe {}",
                    record.parent_node_id, record.universe_id
                )));
            }
            universes.insert(
                record.universe_id.clone(),
                Universe {
                    id: record.universe_id.clone(),
                    node_id: record.parent_node_id.clone(),
                    fixtures: Vec::new(),
                },
            );
        }

        info!(
            "[patchbay::registry] restored {} node(s) and {} universe(s)",
            nodes.len(),
            universes.len()
        );
        self.nodes = nodes;
        self.universes = universes;
        Ok(())
    }
}

/// Serializable registry contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub universes: Vec<UniverseRecord>,
}

impl RegistrySnapshot {
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        serde_json::from_str(json).map_err(|e| RegistryError::InvalidSnapshot(e.to_string()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub ip_addr: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universe_count: Option<usize>,
}

impl NodeRecord {
    fn to_node(&self) -> Result<Node, RegistryError> {
        if self.node_id.is_empty() || self.ip_addr.is_empty() {
            return Err(RegistryError::InvalidSnapshot(format!(
                "invalid node data: {:?}",
                self
            )));
        }
        let ip: Ipv4Addr = self.ip_addr.parse().map_err(|_| {
            RegistryError::InvalidSnapshot(format!(
                "node {} has invalid ip_addr {:?}",
                self.node_id, self.ip_addr
            ))
        })?;
        Ok(Node {
            id: self.node_id.clone(),
            name: self.name.clone().unwrap_or_default(),
            addr: SocketAddrV4::new(ip, self.port),
            universe_count: self.universe_count.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseRecord {
    pub universe_id: String,
    pub parent_node_id: String,
}
