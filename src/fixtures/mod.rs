pub mod models;
pub mod parser;

use std::path::PathBuf;

pub use models::{ChannelDescriptor, FixtureDefinition, FixtureEntry, Mode};
pub use parser::{parse_definition, FixtureLibrary};

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to read fixture definition: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid fixture XML: {0}")]
    Xml(String),
    #[error("invalid fixture definition: {0}")]
    InvalidFixtureDefinition(String),
    #[error("unsupported fixture file {0}")]
    UnsupportedFormat(PathBuf),
}
