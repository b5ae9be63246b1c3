//! Storage item - the metadata record kept for each shard

use crate::shard::ShardStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata record stored per key, plus the transient shard stream.
///
/// The auxiliary maps are keyed by node id and opaque to this crate.
/// `shard` is never persisted; `get` fills it in and `put` clears it.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageItem {
    /// Content-derived identifier
    #[serde(default)]
    pub hash: String,
    /// Storage contracts by node id
    #[serde(default)]
    pub contracts: BTreeMap<String, Value>,
    /// Audit challenges by node id
    #[serde(default)]
    pub challenges: BTreeMap<String, Value>,
    /// Audit merkle trees by node id
    #[serde(default)]
    pub trees: BTreeMap<String, Value>,
    /// Free-form per-node metadata
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
    /// File name of the shard, recorded by `put`; may name a different key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fskey: Option<String>,
    #[serde(skip)]
    pub shard: Option<ShardStream>,
}

impl StorageItem {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Default::default()
        }
    }

    /// File name backing this item's shard: `fskey` when recorded, else `key`.
    pub fn shard_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.fskey.as_deref().unwrap_or(key)
    }

    /// Take the attached shard stream, leaving `None` behind.
    pub fn take_shard(&mut self) -> Option<ShardStream> {
        self.shard.take()
    }

    /// Compare everything except the shard stream.
    pub fn same_metadata(&self, other: &StorageItem) -> bool {
        self.hash == other.hash
            && self.contracts == other.contracts
            && self.challenges == other.challenges
            && self.trees == other.trees
            && self.meta == other.meta
            && self.fskey == other.fskey
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_maps_deserialize() {
        let item: StorageItem =
            serde_json::from_value(json!({"contracts": {}, "challenges": {}, "trees": {}}))
                .unwrap();
        assert!(item.hash.is_empty());
        assert!(item.contracts.is_empty());
        assert!(item.meta.is_empty());
        assert!(item.fskey.is_none());
        assert!(item.shard.is_none());
    }

    #[test]
    fn test_fskey_omitted_when_absent() {
        let item = StorageItem::new("abc");
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("fskey").is_none());
        assert!(value.get("shard").is_none());
        assert_eq!(value["hash"], "abc");
    }

    #[test]
    fn test_shard_key_prefers_fskey() {
        let mut item = StorageItem::new("abc");
        assert_eq!(item.shard_key("abc"), "abc");

        item.fskey = Some("migrated".to_string());
        assert_eq!(item.shard_key("abc"), "migrated");
    }
}
