use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use quick_xml::de::from_str;
use walkdir::WalkDir;

use crate::fixtures::models::{FixtureDefinition, FixtureEntry, QxfDefinition};
use crate::fixtures::DefinitionError;

/// Parse a JSON definition: `{"name": ..., "modes": [{"channels": [...]}]}`.
pub fn parse_json_definition(content: &str) -> Result<FixtureDefinition, DefinitionError> {
    let def: FixtureDefinition = serde_json::from_str(content)?;
    def.validate()?;
    Ok(def)
}

/// Import a QLC+ fixture definition.
pub fn parse_qxf_definition(content: &str) -> Result<FixtureDefinition, DefinitionError> {
    let qxf: QxfDefinition =
        from_str(content).map_err(|e| DefinitionError::Xml(e.to_string()))?;
    let def = FixtureDefinition::from(qxf);
    def.validate()?;
    Ok(def)
}

/// Load a definition file, picking the format from its extension.
pub fn parse_definition(path: &Path) -> Result<FixtureDefinition, DefinitionError> {
    let content = fs::read_to_string(path)?;
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => parse_json_definition(&content),
        Some("qxf") => parse_qxf_definition(&content),
        _ => Err(DefinitionError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Every usable definition below a directory.
pub struct FixtureLibrary {
    root: PathBuf,
    pub entries: Vec<FixtureEntry>,
}

impl FixtureLibrary {
    /// Walk `root` for `.json` and `.qxf` files. Files that fail to parse
    /// are skipped with a warning.
    pub fn scan(root: &Path) -> Result<Self, DefinitionError> {
        if !root.is_dir() {
            return Err(DefinitionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("fixture library {} not found", root.display()),
            )));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if !matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("json") | Some("qxf")
            ) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };

            match parse_definition(path) {
                Ok(def) => entries.push(FixtureEntry {
                    channel_count: def.channel_count(),
                    name: def.name,
                    path: relative.to_string_lossy().to_string(),
                }),
                Err(e) => warn!("[patchbay::fixtures] skipping fixture definition {}: {}", path.display(), e),
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.path.cmp(&b.path)));

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Case-insensitive name search. An empty query pages through everything.
    pub fn search(&self, query: &str, offset: usize, limit: usize) -> Vec<FixtureEntry> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|f| query.is_empty() || f.name.to_lowercase().contains(&query))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Load the full definition behind a library entry.
    pub fn load(&self, relative_path: &str) -> Result<FixtureDefinition, DefinitionError> {
        parse_definition(&self.root.join(relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::models::ChannelDescriptor;

    const PAR: &str = r#"{
        "name": "Par64",
        "modes": [
            {"name": "4ch", "channels": ["Dimmer", {"name": "Red", "type": "Intensity"}, "Green", "Blue"]},
            {"name": "1ch", "channels": ["Dimmer"]}
        ]
    }"#;

    const QXF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<FixtureDefinition xmlns="http://www.qlcplus.org/FixtureDefinition">
 <Manufacturer>Acme</Manufacturer>
 <Model>Dotline180</Model>
 <Type>LED Bar (Pixels)</Type>
 <Channel Name="Dimmer" Preset="IntensityMasterDimmer"/>
 <Channel Name="Strobe">
  <Group Byte="0">Shutter</Group>
 </Channel>
 <Mode Name="2 Channel">
  <Channel Number="0">Dimmer</Channel>
  <Channel Number="1">Strobe</Channel>
 </Mode>
</FixtureDefinition>"#;

    #[test]
    fn json_definition_channel_count() {
        let def = parse_json_definition(PAR).unwrap();
        assert_eq!(def.name, "Par64");
        assert_eq!(def.channel_count(), 4);
        assert_eq!(def.modes[0].channels[1].name(), Some("Red"));
        assert_eq!(def.mode("1ch").unwrap().channels.len(), 1);
    }

    #[test]
    fn json_channels_can_be_arbitrary() {
        let def = parse_json_definition(r#"{"name": "Odd", "modes": [{"channels": [1, {"offset": 2}]}]}"#).unwrap();
        assert_eq!(def.channel_count(), 2);
        assert!(matches!(def.modes[0].channels[0], ChannelDescriptor::Other(_)));
    }

    #[test]
    fn json_definition_rejects_missing_parts() {
        for bad in [
            r#"{"modes": [{"channels": ["Dimmer"]}]}"#,
            r#"{"name": "", "modes": [{"channels": ["Dimmer"]}]}"#,
            r#"{"name": "No modes"}"#,
            r#"{"name": "Empty modes", "modes": []}"#,
            r#"{"name": "Zero width", "modes": [{"channels": []}]}"#,
        ] {
            assert!(
                matches!(
                    parse_json_definition(bad),
                    Err(DefinitionError::InvalidFixtureDefinition(_))
                ),
                "accepted {bad}"
            );
        }
        assert!(matches!(
            parse_json_definition("not json"),
            Err(DefinitionError::Json(_))
        ));
    }

    #[test]
    fn qxf_import() {
        let def = parse_qxf_definition(QXF).unwrap();
        assert_eq!(def.name, "Acme Dotline180");
        assert_eq!(def.channel_count(), 2);
        assert_eq!(
            def.modes[0].channels,
            vec![
                ChannelDescriptor::Detailed {
                    name: "Dimmer".into(),
                    kind: Some("IntensityMasterDimmer".into()),
                },
                ChannelDescriptor::Detailed {
                    name: "Strobe".into(),
                    kind: Some("Shutter".into()),
                },
            ]
        );
    }

    #[test]
    fn library_scan_and_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Acme")).unwrap();
        std::fs::write(dir.path().join("Acme/Acme-Dotline180.qxf"), QXF).unwrap();
        std::fs::write(dir.path().join("par64.json"), PAR).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let library = FixtureLibrary::scan(dir.path()).unwrap();
        let names: Vec<&str> = library.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Dotline180", "Par64"]);

        let hits = library.search("DOT", 0, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].channel_count, 2);
        assert_eq!(library.search("", 1, 10).len(), 1);

        let def = library.load("par64.json").unwrap();
        assert_eq!(def.channel_count(), 4);
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.yaml");
        std::fs::write(&path, "name: x").unwrap();
        assert!(matches!(
            parse_definition(&path),
            Err(DefinitionError::UnsupportedFormat(_))
        ));
    }
}
