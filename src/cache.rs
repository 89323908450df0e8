//! Process-wide cache for the three invariant, expensive-to-refetch
//! actions. Read once at startup, written after each successful
//! cache-eligible call.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::WpuError;

const SCHEMA_VERSION: &str = "1";

/// Serializes a byte sequence as `"0x.."` hex strings, preserving the
/// on-wire representation exactly.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("0x{b:02x}")).collect();
                hex.serialize(s)
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let hex: Option<Vec<String>> = Option::deserialize(d)?;
        match hex {
            Some(strings) => {
                let bytes = strings
                    .iter()
                    .map(|s| {
                        u8::from_str_radix(s.trim_start_matches("0x"), 16)
                            .map_err(serde::de::Error::custom)
                    })
                    .collect::<Result<Vec<u8>, _>>()?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WpuCache {
    #[serde(with = "hex_bytes")]
    nodeid: Option<Vec<u8>>,
    #[serde(with = "hex_bytes")]
    serial: Option<Vec<u8>>,
    #[serde(with = "hex_bytes")]
    datatype: Option<Vec<u8>>,
    schema_version: String,

    #[serde(skip)]
    pub(crate) path: PathBuf,
}

impl WpuCache {
    /// Reads the cache file at `path`; a missing file yields an empty
    /// cache, matching the Python original's behavior.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WpuError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            log::debug!("not loading cache file: {} does not exist", path.display());
            return Ok(Self::empty_at(path));
        }
        let contents = fs::read_to_string(&path)?;
        let mut cache: WpuCache = serde_json::from_str(&contents)?;
        cache.path = path;
        Ok(cache)
    }

    pub fn empty() -> Self {
        Self::empty_at(PathBuf::from("itho-wpu-cache.json"))
    }

    fn empty_at(path: PathBuf) -> Self {
        WpuCache {
            nodeid: None,
            serial: None,
            datatype: None,
            schema_version: SCHEMA_VERSION.to_string(),
            path,
        }
    }

    fn slot_mut(&mut self, action: Action) -> Option<&mut Option<Vec<u8>>> {
        match action {
            Action::GetNodeId => Some(&mut self.nodeid),
            Action::GetSerial => Some(&mut self.serial),
            Action::GetDataType => Some(&mut self.datatype),
            _ => None,
        }
    }

    fn slot(&self, action: Action) -> Option<&Option<Vec<u8>>> {
        match action {
            Action::GetNodeId => Some(&self.nodeid),
            Action::GetSerial => Some(&self.serial),
            Action::GetDataType => Some(&self.datatype),
            _ => None,
        }
    }

    pub fn get(&self, action: Action) -> Option<Vec<u8>> {
        self.slot(action).and_then(|s| s.clone())
    }

    pub fn set(&mut self, action: Action, value: Vec<u8>) {
        let path = self.path.clone();
        if let Some(slot) = self.slot_mut(action) {
            *slot = Some(value);
            if let Err(e) = self.write(&path) {
                log::error!("failed to write cache: {e}");
            }
        }
    }

    fn write(&self, path: &Path) -> Result<(), WpuError> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
