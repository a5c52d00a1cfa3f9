//! Session snapshots
//!
//! Produced by `destroy`, consumed by `restore`. Entries keep the stored
//! JSON text as-is so a restore writes back exactly what was captured.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SessionError;
use crate::Result;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    entries: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entries: entries.into_iter().collect(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(encoded)
            .map_err(|e| SessionError::InvalidSnapshot(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SessionError::InvalidSnapshot(format!(
                "unsupported version {}",
                snapshot.version
            )));
        }

        if let Some((key, _)) = snapshot
            .entries
            .iter()
            .find(|(_, value)| serde_json::from_str::<serde_json::Value>(value).is_err())
        {
            return Err(SessionError::InvalidSnapshot(format!(
                "entry '{}' is not valid JSON",
                key
            )));
        }

        Ok(snapshot)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, String)> {
        self.entries.into_iter().collect()
    }
}
