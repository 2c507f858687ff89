//! Address allocation for fixtures.
//!
//! Every fixture lives in exactly one universe and the address ranges of the
//! fixtures in a universe never overlap. A request for several instances is
//! validated in full before anything is written.

use std::collections::{BTreeMap, HashSet};

use log::info;
use uuid::Uuid;

use crate::models::universe::{Fixture, UNIVERSE_CAPACITY};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("universe {0:?} not found")]
    UniverseNotFound(String),
    #[error("start address {0} is outside 1..=512")]
    InvalidStartAddress(u16),
    #[error("fixture must use at least one channel")]
    InvalidChannelCount,
    #[error("quantity must be at least one")]
    InvalidQuantity,
    #[error("last address {end} exceeds universe capacity of 512")]
    CapacityExceeded { end: u32 },
    #[error("addresses {start}-{end} overlap fixture {existing:?}")]
    OverlapDetected {
        existing: String,
        start: u16,
        end: u16,
    },
    #[error("fixture id {0:?} is already patched")]
    DuplicateFixtureId(String),
    #[error("fixture {0:?} not found")]
    FixtureNotFound(String),
}

/// One call to [`PatchEngine::patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    /// Used verbatim for a single instance, as a prefix otherwise.
    pub fixture_id: String,
    pub name: String,
    pub channels: u16,
    pub universe_id: String,
    pub start_address: u16,
    pub quantity: u16,
}

impl PatchRequest {
    pub fn single(
        fixture_id: impl Into<String>,
        name: impl Into<String>,
        channels: u16,
        universe_id: impl Into<String>,
        start_address: u16,
    ) -> Self {
        Self {
            fixture_id: fixture_id.into(),
            name: name.into(),
            channels,
            universe_id: universe_id.into(),
            start_address,
            quantity: 1,
        }
    }

    pub fn with_quantity(mut self, quantity: u16) -> Self {
        self.quantity = quantity;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatchEngine {
    fixtures: BTreeMap<String, Fixture>,
}

impl PatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and commit `request`. Returns the ids of the new fixtures.
    ///
    /// Checks run in order: universe exists, start address in range,
    /// channel count and quantity non-zero, last instance fits, no overlap
    /// with fixtures already in the universe, fixture id unused.
    pub fn patch(
        &mut self,
        registry: &mut Registry,
        request: &PatchRequest,
    ) -> Result<Vec<String>, PatchError> {
        let planned = self.plan(registry, request)?;

        let universe = registry
            .universe_mut(&request.universe_id)
            .ok_or_else(|| PatchError::UniverseNotFound(request.universe_id.clone()))?;

        let mut ids = Vec::with_capacity(planned.len());
        for fixture in planned {
            info!(
                "[patchbay::patch] patched fixture {} ({:?}) to universe {} at {}-{}",
                fixture.id,
                fixture.name,
                fixture.universe_id,
                fixture.start_address,
                fixture.end_address()
            );
            universe.fixtures.push(fixture.id.clone());
            ids.push(fixture.id.clone());
            self.fixtures.insert(fixture.id.clone(), fixture);
        }
        Ok(ids)
    }

    /// Build the fixtures `request` would create without touching any state.
    fn plan(
        &self,
        registry: &Registry,
        request: &PatchRequest,
    ) -> Result<Vec<Fixture>, PatchError> {
        if registry.universe(&request.universe_id).is_none() {
            return Err(PatchError::UniverseNotFound(request.universe_id.clone()));
        }

        let start = request.start_address;
        if start < 1 || start > UNIVERSE_CAPACITY {
            return Err(PatchError::InvalidStartAddress(start));
        }
        if request.channels == 0 {
            return Err(PatchError::InvalidChannelCount);
        }
        if request.quantity == 0 {
            return Err(PatchError::InvalidQuantity);
        }

        let end = u32::from(start) + u32::from(request.channels) * u32::from(request.quantity) - 1;
        if end > u32::from(UNIVERSE_CAPACITY) {
            return Err(PatchError::CapacityExceeded { end });
        }

        // Ranges fit in a u16 from here on.
        let ranges: Vec<(u16, u16)> = (0..request.quantity)
            .map(|i| {
                let first = start + i * request.channels;
                (first, first + request.channels - 1)
            })
            .collect();

        // The engine's own records decide occupancy, whatever the registry's
        // fixture lists currently say.
        let occupied = self
            .fixtures
            .values()
            .filter(|f| f.universe_id == request.universe_id);
        for existing in occupied {
            for &(first, last) in &ranges {
                if overlaps(first, last, existing.start_address, existing.end_address()) {
                    return Err(PatchError::OverlapDetected {
                        existing: existing.id.clone(),
                        start: first,
                        end: last,
                    });
                }
            }
        }

        let ids = if request.quantity == 1 {
            if self.fixtures.contains_key(&request.fixture_id) {
                return Err(PatchError::DuplicateFixtureId(request.fixture_id.clone()));
            }
            vec![request.fixture_id.clone()]
        } else {
            self.instance_ids(&request.fixture_id, request.quantity as usize)
        };

        Ok(ids
            .into_iter()
            .zip(ranges)
            .map(|(id, (first, _))| Fixture {
                id,
                name: request.name.clone(),
                channels: request.channels,
                universe_id: request.universe_id.clone(),
                start_address: first,
            })
            .collect())
    }

    /// `count` fresh ids of the form `{base}-{token}`, unique against every
    /// patched fixture and each other.
    fn instance_ids(&self, base: &str, count: usize) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(count);
        let mut taken: HashSet<String> = HashSet::with_capacity(count);
        while ids.len() < count {
            let token = Uuid::new_v4().simple().to_string();
            let id = format!("{}-{}", base, &token[..8]);
            if self.fixtures.contains_key(&id) || !taken.insert(id.clone()) {
                continue;
            }
            ids.push(id);
        }
        ids
    }

    /// Unpatch a fixture and free its addresses.
    pub fn remove_fixture(&mut self, registry: &mut Registry, id: &str) -> Result<Fixture, PatchError> {
        let fixture = self
            .fixtures
            .remove(id)
            .ok_or_else(|| PatchError::FixtureNotFound(id.to_string()))?;
        if let Some(universe) = registry.universe_mut(&fixture.universe_id) {
            universe.fixtures.retain(|f| f != id);
        }
        info!(
            "[patchbay::patch] removed fixture {} from universe {}",
            id, fixture.universe_id
        );
        Ok(fixture)
    }

    pub fn fixture(&self, id: &str) -> Option<&Fixture> {
        self.fixtures.get(id)
    }

    pub fn fixtures(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.values()
    }

    /// Fixtures in `universe_id`, lowest address first.
    pub fn fixtures_in_universe(&self, universe_id: &str) -> Vec<&Fixture> {
        let mut found: Vec<&Fixture> = self
            .fixtures
            .values()
            .filter(|f| f.universe_id == universe_id)
            .collect();
        found.sort_by_key(|f| f.start_address);
        found
    }

    /// Lowest start address where `channels` consecutive addresses are free.
    /// `None` if the universe does not exist or nothing fits.
    pub fn next_free_address(
        &self,
        registry: &Registry,
        universe_id: &str,
        channels: u16,
    ) -> Option<u16> {
        registry.universe(universe_id)?;
        if channels == 0 || channels > UNIVERSE_CAPACITY {
            return None;
        }
        let mut candidate: u16 = 1;
        for fixture in self.fixtures_in_universe(universe_id) {
            if u32::from(candidate) + u32::from(channels) - 1 < u32::from(fixture.start_address) {
                return Some(candidate);
            }
            candidate = candidate.max(fixture.end_address() + 1);
        }
        (u32::from(candidate) + u32::from(channels) - 1 <= u32::from(UNIVERSE_CAPACITY))
            .then_some(candidate)
    }

    pub fn clear(&mut self) {
        self.fixtures.clear();
    }
}

/// Inclusive ranges `[a, b]` and `[c, d]` share at least one address.
fn overlaps(a: u16, b: u16, c: u16, d: u16) -> bool {
    !(b < c || a > d)
}
