//! Investigation-keyed in-memory stores with optional JSON snapshots.
//!
//! Each investigation owns one set of stores; stores exclusively own their
//! records. Writes to the same investigation are serialized by the store
//! lock, concurrent readers are permitted, and snapshot files are
//! deterministic: reloading and re-snapshotting yields a byte-identical
//! file.

mod articles;
mod classifications;
mod facts;
mod verifications;

pub use articles::{ArticleSet, ArticleStore, SaveReport};
pub use classifications::{ClassificationCounts, ClassificationStore};
pub use facts::{FactStore, FactWithVariants};
pub use verifications::VerificationStore;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Write a snapshot value as pretty JSON.
pub(crate) fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a snapshot value back.
pub(crate) fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
