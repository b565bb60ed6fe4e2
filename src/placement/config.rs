//! Store Config Resolution
//!
//! Folds a string-keyed configuration bag into a typed [`StoreConfig`].
//! Unknown keys are ignored and numbers that do not parse resolve to zero;
//! callers that need validation must check the resolved values.

use crate::domain::model::StoreConfig;
use std::collections::BTreeMap;

pub const STORE_TYPE_KEY: &str = "storeType";
pub const WAL_SIZE_MB_KEY: &str = "walSizeMB";
pub const DATABASE_SIZE_MB_KEY: &str = "databaseSizeMB";
pub const JOURNAL_SIZE_MB_KEY: &str = "journalSizeMB";

/// Resolve a configuration bag into a store config
pub fn resolve_store_config(overrides: &BTreeMap<String, String>) -> StoreConfig {
    let mut config = StoreConfig::default();
    for (key, value) in overrides {
        match key.as_str() {
            STORE_TYPE_KEY => config.store_type = value.clone(),
            WAL_SIZE_MB_KEY => config.wal_size_mb = int_or_zero(value),
            DATABASE_SIZE_MB_KEY => config.database_size_mb = int_or_zero(value),
            JOURNAL_SIZE_MB_KEY => config.journal_size_mb = int_or_zero(value),
            _ => {}
        }
    }
    config
}

/// Layer `overlay` on top of `base`; overlay keys win
pub fn merge_config(
    base: &BTreeMap<String, String>,
    overlay: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn int_or_zero(raw: &str) -> i64 {
    raw.parse().unwrap_or(0)
}
