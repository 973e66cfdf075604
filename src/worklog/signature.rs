//! Content signatures for cached worklog entries

use crate::store::{EntryType, GroupBy};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Deterministic SHA-256 over a commit set plus generation determinants
///
/// Hashes are deduplicated and sorted first, so discovery order never changes
/// the result.
pub fn content_signature<'a>(
    hashes: impl IntoIterator<Item = &'a str>,
    entry_type: EntryType,
    group_by: GroupBy,
    summarizer: &str,
) -> String {
    let sorted: BTreeSet<&str> = hashes.into_iter().collect();

    let mut hasher = Sha256::new();
    for hash in &sorted {
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\0");
    hasher.update(entry_type.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(group_by.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(summarizer.as_bytes());

    hex::encode(hasher.finalize())
}
