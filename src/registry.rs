//! Device → table and device → tag lookup, rebuilt from every `start` document.
//!
//! The `start` document lists tables; each table carries a device model (tags
//! shared by all its devices) and its devices, which may override tags by id:
//!
//! ```json
//! {
//!   "tables": [{
//!     "id": "boiler",
//!     "device": { "tags": [{ "id": "temp", "fixed": 1 }] },
//!     "devices": [{ "id": "b-1", "device": { "tags": [{ "id": "temp", "scale": 0.1 }] } }]
//!   }]
//! }
//! ```
//!
//! A new document is indexed completely before it replaces the current one, so
//! concurrent lookups see either the old or the new configuration, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::TagSpec;

/// Root of the `start` configuration document. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDocument {
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl DeviceDocument {
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub id: String,
    /// Tags shared by every device of the table
    #[serde(default)]
    pub device: DeviceModel,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceModel {
    #[serde(default)]
    pub tags: Vec<TagSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Device-specific tags, overriding table tags with the same id
    #[serde(default)]
    pub device: DeviceModel,
}

/// Counts reported after a reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub tables: usize,
    pub devices: usize,
    pub tags: usize,
}

#[derive(Debug, Default)]
struct RegistryIndex {
    tables: HashMap<String, String>,
    tags: HashMap<(String, String), Arc<TagSpec>>,
    stats: RegistryStats,
}

impl RegistryIndex {
    fn build(document: &DeviceDocument) -> Self {
        let mut index = RegistryIndex::default();
        index.stats.tables = document.tables.len();

        for table in &document.tables {
            let shared: Vec<Arc<TagSpec>> = table.device.tags.iter().cloned().map(Arc::new).collect();

            for device in &table.devices {
                if let Some(existing) = index.tables.get(&device.id) {
                    tracing::warn!(
                        device = %device.id,
                        table = %table.id,
                        registered_table = %existing,
                        "Device id listed in more than one table; keeping the first"
                    );
                    continue;
                }
                index.tables.insert(device.id.clone(), table.id.clone());
                index.stats.devices += 1;

                for tag in &shared {
                    index
                        .tags
                        .insert((device.id.clone(), tag.id.clone()), Arc::clone(tag));
                }
                for tag in &device.device.tags {
                    index
                        .tags
                        .insert((device.id.clone(), tag.id.clone()), Arc::new(tag.clone()));
                }
            }
        }

        index.stats.tags = index.tags.len();
        index
    }
}

/// Current device configuration.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    index: RwLock<Arc<RegistryIndex>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: &DeviceDocument) -> Self {
        Self {
            index: RwLock::new(Arc::new(RegistryIndex::build(document))),
        }
    }

    /// Replace the whole configuration.
    pub fn replace(&self, document: &DeviceDocument) -> RegistryStats {
        let index = Arc::new(RegistryIndex::build(document));
        let stats = index.stats;
        *self.index.write() = index;
        tracing::info!(
            tables = stats.tables,
            devices = stats.devices,
            tags = stats.tags,
            "Device registry reloaded"
        );
        stats
    }

    /// Table the device belongs to.
    #[must_use]
    pub fn lookup(&self, device_id: &str) -> Option<String> {
        self.index.read().tables.get(device_id).cloned()
    }

    /// Tag configuration of one device tag.
    #[must_use]
    pub fn tag(&self, device_id: &str, tag_id: &str) -> Option<Arc<TagSpec>> {
        self.index
            .read()
            .tags
            .get(&(device_id.to_string(), tag_id.to_string()))
            .cloned()
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.index.read().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "driverSettings": {"poll": 5},
        "tables": [
            {
                "id": "boiler",
                "device": {"tags": [{"id": "temp", "fixed": 1}, {"id": "pressure"}]},
                "devices": [
                    {"id": "b-1", "name": "Boiler 1", "device": {"tags": [{"id": "temp", "scale": 0.1}]}},
                    {"id": "b-2"}
                ]
            },
            {"id": "pump", "devices": [{"id": "p-1"}, {"id": "b-2"}]}
        ]
    }"#;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::from_document(&DeviceDocument::from_slice(DOCUMENT.as_bytes()).unwrap())
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        assert_eq!(registry.lookup("b-1").as_deref(), Some("boiler"));
        assert_eq!(registry.lookup("p-1").as_deref(), Some("pump"));
        assert_eq!(registry.lookup("missing"), None);
    }

    #[test]
    fn test_device_tags_override_table_tags() {
        let registry = registry();
        let overridden = registry.tag("b-1", "temp").unwrap();
        assert_eq!(overridden.scale, Some(0.1));
        assert_eq!(overridden.fixed, None);

        let inherited = registry.tag("b-2", "temp").unwrap();
        assert_eq!(inherited.fixed, Some(1));
        assert!(registry.tag("b-1", "pressure").is_some());
    }

    #[test]
    fn test_duplicate_device_keeps_first_table() {
        let registry = registry();
        assert_eq!(registry.lookup("b-2").as_deref(), Some("boiler"));
        assert_eq!(
            registry.stats(),
            RegistryStats {
                tables: 2,
                devices: 3,
                tags: 4,
            }
        );
    }

    #[test]
    fn test_replace_swaps_everything() {
        let registry = registry();
        let stats = registry.replace(&DeviceDocument {
            tables: vec![TableConfig {
                id: "fan".into(),
                devices: vec![DeviceConfig {
                    id: "f-1".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        });
        assert_eq!(stats.devices, 1);
        assert_eq!(registry.lookup("b-1"), None);
        assert_eq!(registry.lookup("f-1").as_deref(), Some("fan"));
    }

    #[test]
    fn test_bad_action_rejects_document() {
        let json = r#"{"tables": [{"id": "t", "device": {"tags": [{"id": "x", "range": {"action": "clip"}}]}}]}"#;
        assert!(DeviceDocument::from_slice(json.as_bytes()).is_err());
    }
}
