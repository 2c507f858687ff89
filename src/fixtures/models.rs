use serde::{Deserialize, Serialize};

use crate::fixtures::DefinitionError;

/// A fixture type as read from a definition file. Never mutated once loaded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FixtureDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modes: Vec<Mode>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Mode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub channels: Vec<ChannelDescriptor>,
}

/// One channel of a mode. Only the count matters for patching, so anything
/// that is not a name or a `{name, type}` object is kept as raw JSON.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ChannelDescriptor {
    Name(String),
    Detailed {
        name: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    Other(serde_json::Value),
}

impl ChannelDescriptor {
    pub fn name(&self) -> Option<&str> {
        match self {
            ChannelDescriptor::Name(name) | ChannelDescriptor::Detailed { name, .. } => Some(name),
            ChannelDescriptor::Other(_) => None,
        }
    }
}

impl FixtureDefinition {
    /// Channel width used for patching: the length of the first mode.
    pub fn channel_count(&self) -> usize {
        self.modes.first().map_or(0, |m| m.channels.len())
    }

    pub fn mode(&self, name: &str) -> Option<&Mode> {
        self.modes.iter().find(|m| m.name == name)
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::InvalidFixtureDefinition(
                "missing name".into(),
            ));
        }
        let Some(first) = self.modes.first() else {
            return Err(DefinitionError::InvalidFixtureDefinition(format!(
                "{}: no modes",
                self.name
            )));
        };
        if first.channels.is_empty() {
            return Err(DefinitionError::InvalidFixtureDefinition(format!(
                "{}: first mode has no channels",
                self.name
            )));
        }
        if first.channels.len() > crate::models::universe::UNIVERSE_CAPACITY as usize {
            return Err(DefinitionError::InvalidFixtureDefinition(format!(
                "{}: {} channels do not fit in a universe",
                self.name,
                first.channels.len()
            )));
        }
        Ok(())
    }
}

/// A definition file found while scanning the fixture library.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FixtureEntry {
    pub name: String,
    pub path: String, // Relative to the library root, e.g. "Acme/Dotline180.qxf"
    pub channel_count: usize,
}

// -----------------------------------------------------------------------------
// QLC+ .qxf import
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct QxfDefinition {
    pub manufacturer: String,
    pub model: String,
    #[serde(rename = "Channel", default)]
    pub channels: Vec<QxfChannel>,
    #[serde(rename = "Mode", default)]
    pub modes: Vec<QxfMode>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct QxfChannel {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Preset", default)]
    pub preset: Option<String>,
    pub group: Option<QxfGroup>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct QxfGroup {
    #[serde(rename = "$value")]
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct QxfMode {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "Channel", default)]
    pub channels: Vec<QxfModeChannel>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct QxfModeChannel {
    #[serde(rename = "$value")]
    pub name: String,
}

impl From<QxfDefinition> for FixtureDefinition {
    fn from(qxf: QxfDefinition) -> Self {
        let kind_of = |channel_name: &str| {
            qxf.channels
                .iter()
                .find(|c| c.name == channel_name)
                .and_then(|c| c.preset.clone().or_else(|| c.group.as_ref().map(|g| g.value.clone())))
        };

        let modes = qxf
            .modes
            .iter()
            .map(|mode| Mode {
                name: mode.name.clone(),
                channels: mode
                    .channels
                    .iter()
                    .map(|ch| ChannelDescriptor::Detailed {
                        name: ch.name.clone(),
                        kind: kind_of(&ch.name),
                    })
                    .collect(),
            })
            .collect();

        FixtureDefinition {
            name: format!("{} {}", qxf.manufacturer, qxf.model),
            modes,
        }
    }
}
