//! Saving and loading a whole patch: nodes, universes and fixtures.

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::patch::{PatchEngine, PatchError, PatchRequest};
use crate::patchbay::Patchbay;
use crate::registry::{Registry, RegistryError, RegistrySnapshot};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to access session file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid session JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("fixture {fixture_id:?} cannot be restored: {source}")]
    Fixture {
        fixture_id: String,
        #[source]
        source: PatchError,
    },
}

/// On-disk session. The registry part is the plain registry snapshot, so a
/// snapshot file without `fixtures` loads as an empty patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(flatten)]
    pub registry: RegistrySnapshot,
    #[serde(default)]
    pub fixtures: Vec<FixtureRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub fixture_id: String,
    pub name: String,
    pub channels: u16,
    pub universe_id: String,
    pub start_address: u16,
}

impl Patchbay {
    pub fn session(&self) -> SessionFile {
        let state = self.read();
        // Universe fixture lists keep patch order; replaying in that order
        // rebuilds them exactly.
        let fixtures = state
            .registry
            .universes()
            .flat_map(|u| u.fixtures.iter())
            .filter_map(|id| state.engine.fixture(id))
            .map(|f| FixtureRecord {
                fixture_id: f.id.clone(),
                name: f.name.clone(),
                channels: f.channels,
                universe_id: f.universe_id.clone(),
                start_address: f.start_address,
            })
            .collect();
        SessionFile {
            registry: state.registry.snapshot(),
            fixtures,
        }
    }

    /// Replace the whole patch with `session`. Every fixture goes through
    /// the normal patch checks; if any fails, nothing changes.
    pub fn load_session(&self, session: &SessionFile) -> Result<(), SessionError> {
        let mut registry = Registry::new();
        registry.restore(&session.registry)?;

        let mut engine = PatchEngine::new();
        for record in &session.fixtures {
            let request = PatchRequest::single(
                record.fixture_id.clone(),
                record.name.clone(),
                record.channels,
                record.universe_id.clone(),
                record.start_address,
            );
            engine
                .patch(&mut registry, &request)
                .map_err(|source| SessionError::Fixture {
                    fixture_id: record.fixture_id.clone(),
                    source,
                })?;
        }

        let mut state = self.write();
        state.registry = registry;
        state.engine = engine;
        info!("[patchbay::session] loaded session with {} fixture(s)", session.fixtures.len());
        Ok(())
    }
}

pub fn save(path: &Path, bay: &Patchbay) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&bay.session())?;
    fs::write(path, json)?;
    info!("[patchbay::session] saved session to {}", path.display());
    Ok(())
}

pub fn load(path: &Path, bay: &Patchbay) -> Result<(), SessionError> {
    let content = fs::read_to_string(path)?;
    let session: SessionFile = serde_json::from_str(&content)?;
    bay.load_session(&session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn populated() -> Patchbay {
        let bay = Patchbay::new();
        bay.register_node("n1", "Left", SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 6454), 2)
            .unwrap();
        bay.register_universe("0", "n1").unwrap();
        bay.register_universe("1", "n1").unwrap();
        bay.patch(&PatchRequest::single("F2", "Wash", 8, "0", 20)).unwrap();
        bay.patch(&PatchRequest::single("F1", "Par64", 4, "0", 1)).unwrap();
        bay.patch(&PatchRequest::single("PAR", "Par64", 4, "1", 1).with_quantity(2))
            .unwrap();
        bay
    }

    #[test]
    fn session_round_trip_restores_everything() {
        let bay = populated();
        let session = bay.session();
        assert_eq!(session.fixtures.len(), 4);

        let copy = Patchbay::new();
        copy.load_session(&session).unwrap();
        assert_eq!(copy.state(), bay.state());
    }

    #[test]
    fn bad_fixture_rejects_whole_session() {
        let bay = populated();
        let before = bay.state();

        let mut session = bay.session();
        session.fixtures.push(FixtureRecord {
            fixture_id: "clash".into(),
            name: "Wash".into(),
            channels: 8,
            universe_id: "0".into(),
            start_address: 3,
        });
        assert!(matches!(
            bay.load_session(&session),
            Err(SessionError::Fixture { ref fixture_id, source: PatchError::OverlapDetected { .. } })
                if fixture_id == "clash"
        ));
        assert_eq!(bay.state(), before);
    }

    #[test]
    fn plain_registry_snapshot_loads() {
        let json = r#"{
            "nodes": [{"node_id": "n1", "ip_addr": "10.0.0.5", "port": 6454}],
            "universes": [{"universe_id": "0", "parent_node_id": "n1"}]
        }"#;
        let session: SessionFile = serde_json::from_str(json).unwrap();
        assert!(session.fixtures.is_empty());

        let bay = Patchbay::new();
        bay.load_session(&session).unwrap();
        assert_eq!(bay.state().universes["0"].node_id, "n1");
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show").join("session.json");
        let bay = populated();
        save(&path, &bay).unwrap();

        let copy = Patchbay::new();
        load(&path, &copy).unwrap();
        assert_eq!(copy.state(), bay.state());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let bay = Patchbay::new();
        assert!(matches!(
            load(&dir.path().join("missing.json"), &bay),
            Err(SessionError::Io(_))
        ));
    }
}
