use std::collections::BTreeMap;

use crate::fingerprint::DatasetFingerprint;

pub const TAG_JUDGE_ID: &str = "judge_id";
pub const TAG_JUDGE_VERSION: &str = "judge_version";
pub const TAG_DATASET_VERSION: &str = "dataset_version";

/// Evaluation-run cache key: `{judge_id}:{judge_version}:{fingerprint}`.
pub fn evaluation_key(judge_id: &str, judge_version: u32, dataset: &DatasetFingerprint) -> String {
    format!("{}:{}:{}", judge_id, judge_version, dataset)
}

/// Prefix shared by every evaluation-run key of a judge.
pub fn judge_prefix(judge_id: &str) -> String {
    format!("{}:", judge_id)
}

/// Tags a run starts with. Without the dataset tag it cannot match a lookup.
pub fn pending_run_tags(judge_id: &str, judge_version: u32) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TAG_JUDGE_ID.to_string(), judge_id.to_string()),
        (TAG_JUDGE_VERSION.to_string(), judge_version.to_string()),
    ])
}

/// Tags identifying a completed evaluation run on the trace backend.
pub fn evaluation_tags(
    judge_id: &str,
    judge_version: u32,
    dataset: &DatasetFingerprint,
) -> BTreeMap<String, String> {
    let mut tags = pending_run_tags(judge_id, judge_version);
    tags.insert(TAG_DATASET_VERSION.to_string(), dataset.to_string());
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    #[test]
    fn test_key_layout() {
        let fp = fingerprint(["a", "b"]);
        assert_eq!(evaluation_key("judge-1", 2, &fp), "judge-1:2:fb8e20fc");
        assert!(evaluation_key("judge-1", 2, &fp).starts_with(&judge_prefix("judge-1")));
        assert!(!evaluation_key("judge-10", 2, &fp).starts_with(&judge_prefix("judge-1")));
    }

    #[test]
    fn test_tags() {
        let fp = fingerprint(["a"]);
        let tags = evaluation_tags("j", 4, &fp);
        assert_eq!(tags[TAG_JUDGE_VERSION], "4");
        assert_eq!(tags[TAG_DATASET_VERSION], fp.as_str());
        assert!(!pending_run_tags("j", 4).contains_key(TAG_DATASET_VERSION));
    }
}
