//! Shared handle over the registry and the patch engine.
//!
//! Writers hold one exclusive lock across validation and commit, so two
//! patches can never both pass the overlap check against the same state.
//! Readers share the lock and always see a whole write or none of it.

use std::net::SocketAddrV4;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use artnet::{discover, DiscoveryConfig, DiscoveryError, NodeDescriptor};
use log::{info, warn};

use crate::fixtures::FixtureDefinition;
use crate::models::state::StateView;
use crate::models::universe::{Fixture, Universe};
use crate::patch::{PatchEngine, PatchError, PatchRequest};
use crate::registry::{Registry, RegistryError, RegistrySnapshot};

#[derive(Debug, Default)]
pub(crate) struct PatchState {
    pub registry: Registry,
    pub engine: PatchEngine,
}

#[derive(Debug, Clone, Default)]
pub struct Patchbay {
    inner: Arc<RwLock<PatchState>>,
}

impl Patchbay {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, PatchState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PatchState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_node(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        addr: SocketAddrV4,
        universe_count: usize,
    ) -> Result<(), RegistryError> {
        self.write()
            .registry
            .register_node(id, name, addr, universe_count)
    }

    pub fn register_universe(
        &self,
        id: impl Into<String>,
        parent_node_id: &str,
    ) -> Result<(), RegistryError> {
        self.write().registry.register_universe(id, parent_node_id)
    }

    /// Detach and forget a universe. Refused while fixtures are patched
    /// into it.
    pub fn remove_universe(&self, id: &str) -> Result<Universe, RegistryError> {
        let mut state = self.write();
        let patched = state.engine.fixtures_in_universe(id).len();
        if patched > 0 {
            return Err(RegistryError::UniverseInUse {
                universe_id: id.to_string(),
                fixtures: patched,
            });
        }
        state.registry.remove_universe(id)
    }

    pub fn patch(&self, request: &PatchRequest) -> Result<Vec<String>, PatchError> {
        let mut state = self.write();
        let PatchState { registry, engine } = &mut *state;
        engine.patch(registry, request)
    }

    /// Patch `quantity` instances of `definition`, using its name and the
    /// channel count of its first mode.
    pub fn patch_definition(
        &self,
        definition: &FixtureDefinition,
        fixture_id: impl Into<String>,
        universe_id: impl Into<String>,
        start_address: u16,
        quantity: u16,
    ) -> Result<Vec<String>, PatchError> {
        // Anything wider than u16 fails the capacity check anyway.
        let channels = u16::try_from(definition.channel_count()).unwrap_or(u16::MAX);
        let request = PatchRequest::single(
            fixture_id,
            definition.name.clone(),
            channels,
            universe_id,
            start_address,
        )
        .with_quantity(quantity);
        self.patch(&request)
    }

    pub fn remove_fixture(&self, id: &str) -> Result<Fixture, PatchError> {
        let mut state = self.write();
        let PatchState { registry, engine } = &mut *state;
        engine.remove_fixture(registry, id)
    }

    /// Drop all nodes, universes and fixtures.
    pub fn clear(&self) {
        let mut state = self.write();
        state.engine.clear();
        state.registry.clear();
        info!("[patchbay] cleared patch");
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.read().registry.snapshot()
    }

    /// Replace nodes and universes with `snapshot`. Fixtures are dropped
    /// with the universes they were patched into. On error nothing changes.
    pub fn restore(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        let mut registry = Registry::new();
        registry.restore(snapshot)?;

        let mut state = self.write();
        state.registry = registry;
        state.engine.clear();
        Ok(())
    }

    pub fn state(&self) -> StateView {
        let state = self.read();
        StateView {
            nodes: state
                .registry
                .nodes()
                .map(|n| (n.id.clone(), n.into()))
                .collect(),
            universes: state
                .registry
                .universes()
                .map(|u| (u.id.clone(), u.into()))
                .collect(),
            fixtures: state
                .engine
                .fixtures()
                .map(|f| (f.id.clone(), f.into()))
                .collect(),
        }
    }

    pub fn fixture(&self, id: &str) -> Option<Fixture> {
        self.read().engine.fixture(id).cloned()
    }

    pub fn fixtures_in_universe(&self, universe_id: &str) -> Vec<Fixture> {
        self.read()
            .engine
            .fixtures_in_universe(universe_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn next_free_address(&self, universe_id: &str, channels: u16) -> Option<u16> {
        let state = self.read();
        state
            .engine
            .next_free_address(&state.registry, universe_id, channels)
    }

    /// Upsert one node per descriptor, keyed by its IP address. Returns the
    /// node ids.
    pub fn adopt_discovered(&self, nodes: &[NodeDescriptor], port: u16) -> Vec<String> {
        let mut state = self.write();
        nodes
            .iter()
            .filter_map(|node| {
                let id = node.ip.to_string();
                match state.registry.register_node(
                    id.clone(),
                    node.name.clone(),
                    SocketAddrV4::new(node.ip, port),
                    node.universe_count,
                ) {
                    Ok(()) => Some(id),
                    Err(e) => {
                        warn!("[patchbay] cannot adopt node at {}: {}", node.ip, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Run one discovery round and register every node that answered.
    ///
    /// The state lock is not held while waiting for replies.
    pub async fn discover_nodes(
        &self,
        config: &DiscoveryConfig,
    ) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        let nodes = discover(config).await?;
        self.adopt_discovered(&nodes, config.port);
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread;

    fn bay() -> Patchbay {
        let bay = Patchbay::new();
        bay.register_node("n1", "Node", SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 6454), 1)
            .unwrap();
        bay.register_universe("0", "n1").unwrap();
        bay
    }

    #[test]
    fn state_shape() {
        let bay = bay();
        bay.patch(&PatchRequest::single("F1", "Par64", 4, "0", 1)).unwrap();

        let state = bay.state();
        assert_eq!(state.nodes["n1"].ip, "10.0.0.2");
        assert_eq!(state.nodes["n1"].universe_count, 1);
        assert_eq!(state.universes["0"].node_id, "n1");
        assert_eq!(state.universes["0"].fixtures, vec!["F1"]);
        assert_eq!(state.fixtures["F1"].start_address, 1);
        assert_eq!(state.fixtures["F1"].channels, 4);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["fixtures"]["F1"]["universe_id"], "0");
        assert_eq!(json["nodes"]["n1"]["universe_count"], 1);
    }

    #[test]
    fn concurrent_patches_never_overlap() {
        let bay = bay();
        // Every thread races for the same 8 addresses.
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bay = bay.clone();
                thread::spawn(move || {
                    bay.patch(&PatchRequest::single(format!("F{i}"), "Wash", 8, "0", 1))
                })
            })
            .collect();

        let ok = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(ok, 1);
        assert_eq!(bay.state().fixtures.len(), 1);
        assert_eq!(bay.state().universes["0"].fixtures.len(), 1);
    }

    #[test]
    fn clear_drops_fixtures_too() {
        let bay = bay();
        bay.patch(&PatchRequest::single("F1", "Par64", 4, "0", 1)).unwrap();
        bay.clear();
        assert_eq!(bay.state(), StateView::default());
    }

    #[test]
    fn restore_drops_fixtures_and_keeps_state_on_error() {
        let bay = bay();
        bay.patch(&PatchRequest::single("F1", "Par64", 4, "0", 1)).unwrap();

        let bad = RegistrySnapshot::from_json(
            r#"{"nodes": [], "universes": [{"universe_id": "0", "parent_node_id": "n1"}]}"#,
        )
        .unwrap();
        assert!(bay.restore(&bad).is_err());
        assert!(bay.fixture("F1").is_some());

        let snapshot = bay.snapshot();
        bay.restore(&snapshot).unwrap();
        assert!(bay.fixture("F1").is_none());
        assert_eq!(bay.snapshot(), snapshot);
        assert!(bay.state().universes["0"].fixtures.is_empty());
    }

    #[test]
    fn remove_universe_refused_while_patched() {
        let bay = bay();
        bay.patch(&PatchRequest::single("F1", "Par64", 4, "0", 1)).unwrap();
        assert_eq!(
            bay.remove_universe("0"),
            Err(RegistryError::UniverseInUse {
                universe_id: "0".into(),
                fixtures: 1,
            })
        );
        assert!(bay.state().universes.contains_key("0"));

        bay.remove_fixture("F1").unwrap();
        bay.remove_universe("0").unwrap();
        assert!(bay.state().universes.is_empty());
        assert_eq!(bay.next_free_address("0", 4), None);

        // The node's only port is free again.
        bay.register_universe("5", "n1").unwrap();
    }

    #[test]
    fn empty_ids_never_reach_a_snapshot() {
        let bay = Patchbay::new();
        assert!(bay
            .register_node("", "Ghost", SocketAddrV4::new(Ipv4Addr::LOCALHOST, 6454), 1)
            .is_err());
        bay.register_node("n1", "", SocketAddrV4::new(Ipv4Addr::LOCALHOST, 6454), 0)
            .unwrap();
        assert!(bay.register_universe("", "").is_err());
        bay.register_universe("0", "n1").unwrap();

        let copy = Patchbay::new();
        copy.restore(&bay.snapshot()).unwrap();
        assert_eq!(copy.state(), bay.state());
    }

    #[test]
    fn patch_definition_uses_first_mode() {
        let bay = bay();
        let def = crate::fixtures::parser::parse_json_definition(
            r#"{"name": "Spot", "modes": [{"channels": ["Pan", "Tilt", "Dimmer"]}, {"channels": ["Dimmer"]}]}"#,
        )
        .unwrap();
        let ids = bay.patch_definition(&def, "SPOT", "0", 10, 2).unwrap();
        let starts: Vec<u16> = ids.iter().map(|id| bay.fixture(id).unwrap().start_address).collect();
        assert_eq!(starts, vec![10, 13]);
        assert_eq!(bay.fixture(&ids[0]).unwrap().name, "Spot");
    }

    #[test]
    fn adopt_discovered_keys_by_ip() {
        let bay = Patchbay::new();
        let found = vec![
            NodeDescriptor {
                name: "Left".into(),
                ip: Ipv4Addr::new(10, 0, 0, 5),
                universe_count: 2,
            },
            NodeDescriptor {
                name: "Right".into(),
                ip: Ipv4Addr::new(10, 0, 0, 6),
                universe_count: 1,
            },
        ];
        let ids = bay.adopt_discovered(&found, 6454);
        assert_eq!(ids, vec!["10.0.0.5", "10.0.0.6"]);

        let state = bay.state();
        assert_eq!(state.nodes["10.0.0.5"].name, "Left");
        assert_eq!(state.nodes["10.0.0.5"].universe_count, 2);

        bay.register_universe("0", "10.0.0.6").unwrap();
        assert_eq!(bay.state().universes["0"].node_id, "10.0.0.6");
    }
}
