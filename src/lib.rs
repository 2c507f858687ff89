//! Art-Net node discovery and DMX patch bookkeeping.
//!
//! [`Patchbay`] is the handle a host process keeps: it owns the node and
//! universe [`registry`] and the fixture [`patch`] engine behind one lock.
//! Discovery itself lives in the `artnet` crate.

pub mod fixtures;
pub mod models;
pub mod patch;
pub mod patchbay;
pub mod registry;
pub mod session;
pub mod settings;

pub use artnet::{DiscoveryConfig, DiscoveryError, NodeDescriptor};
pub use fixtures::{DefinitionError, FixtureDefinition, FixtureLibrary};
pub use models::state::StateView;
pub use models::universe::{Fixture, Node, Universe, UNIVERSE_CAPACITY};
pub use patch::{PatchEngine, PatchError, PatchRequest};
pub use patchbay::Patchbay;
pub use registry::{Registry, RegistryError, RegistrySnapshot};
pub use session::{SessionError, SessionFile};
pub use settings::{AppSettings, SettingsError};
