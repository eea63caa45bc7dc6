use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 8;

/// Short digest identifying a set of trace ids ("dataset version").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetFingerprint(String);

impl DatasetFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Computes the dataset fingerprint of a set of trace ids.
///
/// Ids are deduplicated and sorted before hashing, so caller ordering and
/// repeated ids never change the result. The sorted ids are concatenated
/// without a separator.
pub fn fingerprint<I, S>(trace_ids: I) -> DatasetFingerprint
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique: BTreeSet<String> = trace_ids
        .into_iter()
        .map(|id| id.as_ref().to_string())
        .collect();
    let raw: String = unique.into_iter().collect();

    let mut hex = sha256_hex(&raw);
    hex.truncate(FINGERPRINT_LEN);
    DatasetFingerprint(hex)
}
