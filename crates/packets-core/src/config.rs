//! Storage layout configuration

use serde::{Deserialize, Serialize};

use crate::types::{ModuleId, PacketPath};

/// Where packets live in the authoritative store and the mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root folder of everything this library writes
    pub root: String,
    /// Folder (under `root`) holding one namespace per module
    pub modules_dir: String,
    /// Registry file name (under `root`)
    pub registry_file: String,
    /// Shared settings key of the mirror blob
    pub mirror_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: "packets".to_string(),
            modules_dir: "modules".to_string(),
            registry_file: "packets.json".to_string(),
            mirror_key: "packets.packetsMirror".to_string(),
        }
    }
}

impl StoreConfig {
    /// Root folder path
    pub fn root_path(&self) -> String {
        self.root.clone()
    }

    /// Registry blob path
    pub fn registry_path(&self) -> String {
        format!("{}/{}", self.root, self.registry_file)
    }

    /// Folder holding all module namespaces
    pub fn modules_path(&self) -> String {
        format!("{}/{}", self.root, self.modules_dir)
    }

    /// Namespace folder of one module
    pub fn module_path(&self, module: &ModuleId) -> String {
        format!("{}/{}", self.modules_path(), module)
    }

    /// Record file of one packet
    pub fn record_path(&self, path: &PacketPath) -> String {
        format!("{}/{}", self.modules_path(), path)
    }

    /// Record file for a raw registry entry
    pub fn record_path_raw(&self, registry_entry: &str) -> String {
        format!("{}/{}", self.modules_path(), registry_entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = StoreConfig::default();
        assert_eq!(config.registry_path(), "packets/packets.json");
        assert_eq!(config.modules_path(), "packets/modules");
        assert_eq!(config.module_path(&"oif".into()), "packets/modules/oif");
        assert_eq!(
            config.record_path(&PacketPath::new("oif".into(), "sheet1".into())),
            "packets/modules/oif/sheet1.json"
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"root": "data"}"#).unwrap();
        assert_eq!(config.registry_path(), "data/packets.json");
        assert_eq!(config.mirror_key, "packets.packetsMirror");
    }
}
