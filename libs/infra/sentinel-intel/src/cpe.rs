use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::IntelError;

/// Bundled `(service.name, service.version) -> candidate CPEs` table (spec
/// §9.5). Overridable via `SENTINEL_CPE_MAP_PATH` so a deployment can swap
/// in a larger table without a rebuild.
#[derive(Debug, Clone, Default)]
pub struct CpeMapping {
    entries: BTreeMap<(String, String), Vec<String>>,
}

#[derive(Deserialize)]
struct CpeMappingFile {
    #[serde(rename = "mapping")]
    entries: Vec<CpeMappingEntry>,
}

#[derive(Deserialize)]
struct CpeMappingEntry {
    name: String,
    version: String,
    cpes: Vec<String>,
}

pub const DEFAULT_PATH: &str = "config/cpe_mappings.toml";
pub const OVERRIDE_ENV_VAR: &str = "SENTINEL_CPE_MAP_PATH";

impl CpeMapping {
    /// Loads from `$SENTINEL_CPE_MAP_PATH` if set, else the bundled default.
    pub fn load_default() -> Result<Self, IntelError> {
        let path = std::env::var(OVERRIDE_ENV_VAR).unwrap_or_else(|_| DEFAULT_PATH.to_string());
        Self::load_from_path(Path::new(&path))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, IntelError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IntelError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, IntelError> {
        let file: CpeMappingFile =
            toml::from_str(raw).map_err(|e| IntelError::Config(e.to_string()))?;
        let mut entries = BTreeMap::new();
        for entry in file.entries {
            entries.insert((entry.name.to_lowercase(), entry.version), entry.cpes);
        }
        Ok(Self { entries })
    }

    /// Returns `None` when the pair has no known CPE — the enrichment
    /// orchestrator records that as a dead-end rather than treating it as
    /// an error (spec §4.6 step 3).
    pub fn resolve(&self, name: &str, version: &str) -> Option<&[String]> {
        self.entries
            .get(&(name.to_lowercase(), version.to_string()))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[mapping]]
name = "nginx"
version = "1.18.0"
cpes = ["cpe:2.3:a:nginx:nginx:1.18.0:*:*:*:*:*:*:*"]
"#;

    #[test]
    fn resolves_known_name_version_case_insensitively() {
        let mapping = CpeMapping::parse(SAMPLE).unwrap();
        assert!(mapping.resolve("NGINX", "1.18.0").is_some());
    }

    #[test]
    fn unknown_pair_resolves_to_none() {
        let mapping = CpeMapping::parse(SAMPLE).unwrap();
        assert!(mapping.resolve("apache", "2.4.0").is_none());
    }
}
