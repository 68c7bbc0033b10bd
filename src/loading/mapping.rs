//! MCNS ↔ FlyWire correspondence keys.

use crate::error::{BuildError, BuildResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Neuron ID (either dataset) → canonical mapping key.
pub type Mapping = HashMap<u64, String>;

/// Strip the `{dataset}:` prefix off upstream keys and drop null entries.
pub fn parse_upstream_mapping(raw: BTreeMap<String, Value>) -> BuildResult<Mapping> {
    let mut mapping = Mapping::with_capacity(raw.len());
    for (key, value) in raw {
        let id_part = key.rsplit_once(':').map_or(key.as_str(), |(_, id)| id);
        let id: u64 = id_part.trim().parse().map_err(|_| {
            BuildError::decode("mapping", format!("key {key:?} does not end in a neuron ID"))
        })?;
        let target = match value {
            Value::Null => continue,
            Value::String(s) if s.is_empty() => continue,
            Value::String(s) => s,
            other => other.to_string(),
        };
        mapping.insert(id, target);
    }
    Ok(mapping)
}

/// Cached form: plain ID keys, sorted for stable diffs.
pub fn to_cache(mapping: &Mapping) -> BTreeMap<u64, String> {
    mapping.iter().map(|(k, v)| (*k, v.clone())).collect()
}
