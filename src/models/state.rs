use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::models::universe::{Fixture, Node, Universe};

/// Read-only copy of the whole patch, shaped for display.
#[derive(TS, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[ts(export, export_to = "state.ts")]
pub struct StateView {
    pub nodes: BTreeMap<String, NodeView>,
    pub universes: BTreeMap<String, UniverseView>,
    pub fixtures: BTreeMap<String, FixtureView>,
}

#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[ts(export, export_to = "state.ts")]
pub struct NodeView {
    pub name: String,
    pub ip: String,
    #[ts(type = "number")]
    pub universe_count: usize,
}

#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[ts(export, export_to = "state.ts")]
pub struct UniverseView {
    pub node_id: String,
    pub fixtures: Vec<String>,
}

#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[ts(export, export_to = "state.ts")]
pub struct FixtureView {
    pub name: String,
    pub channels: u16,
    pub universe_id: String,
    pub start_address: u16,
}

impl From<&Node> for NodeView {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            ip: node.addr.ip().to_string(),
            universe_count: node.universe_count,
        }
    }
}

impl From<&Universe> for UniverseView {
    fn from(universe: &Universe) -> Self {
        Self {
            node_id: universe.node_id.clone(),
            fixtures: universe.fixtures.clone(),
        }
    }
}

impl From<&Fixture> for FixtureView {
    fn from(fixture: &Fixture) -> Self {
        Self {
            name: fixture.name.clone(),
            channels: fixture.channels,
            universe_id: fixture.universe_id.clone(),
            start_address: fixture.start_address,
        }
    }
}
