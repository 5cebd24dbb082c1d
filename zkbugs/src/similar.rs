//! Cross-link bugs which share a root cause.
//!
//! Groups of similar bugs are curated in `dataset/zkbugs_similar_bugs.json`:
//! ```json
//! {
//!     "circom": [
//!         { "Similar Bugs": ["iden3/circomlib/bug_a", "iden3/circomlib/bug_b"] }
//!     ]
//! }
//! ```
//! where each path is relative to the DSL directory. Every member of a group gets the other
//! members recorded in its `Similar Bugs` field.

use crate::{config::BugConfig, config::CONFIG_FILE, docs};
use anyhow::Error;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Name of the similar-bug index in the dataset directory.
pub const SIMILAR_BUGS_FILE: &str = "zkbugs_similar_bugs.json";

#[derive(Clone, Debug, Deserialize)]
struct Group {
    #[serde(rename = "Similar Bugs")]
    similar_bugs: Vec<String>,
}

/// Apply the similar-bug groups in `index` to the configs under `dataset`, regenerating the README
/// of every updated bug.
///
/// Returns the number of bugs updated.
pub fn update(dataset: impl AsRef<Path>, index: impl AsRef<Path>) -> Result<usize, Error> {
    let dataset = dataset.as_ref();
    let index = index.as_ref();
    let bytes = fs::read(index)
        .map_err(|err| Error::msg(format!("unable to read {}: {err}", index.display())))?;
    let groups: BTreeMap<String, Vec<Group>> = serde_json::from_slice(&bytes)
        .map_err(|err| Error::msg(format!("{} is malformed: {err}", index.display())))?;

    let mut updated = 0;
    for (dsl, groups) in &groups {
        for group in groups {
            for member in &group.similar_bugs {
                let dir = dataset.join(dsl).join(member);
                let path = dir.join(CONFIG_FILE);
                if !path.is_file() {
                    tracing::warn!(
                        "the config file does not exist in the directory '{}'",
                        dir.display()
                    );
                    continue;
                }
                let mut config = match BugConfig::load(&path) {
                    Ok(config) => config,
                    Err(err) => {
                        tracing::error!("{err}");
                        continue;
                    }
                };
                config.bug.similar_bugs = Some(
                    group
                        .similar_bugs
                        .iter()
                        .filter(|other| *other != member)
                        .cloned()
                        .collect(),
                );
                config.save(&path)?;
                if let Err(err) = docs::write_readme(&dir) {
                    tracing::error!("unable to regenerate README for {}: {err}", dir.display());
                }
                updated += 1;
            }
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::write_bug;

    #[test]
    fn test_update() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_bug(dir.path(), "circom/x/y/a", true);
        let b = write_bug(dir.path(), "circom/x/y/b", true);
        let c = write_bug(dir.path(), "circom/x/z/c", true);
        let index = dir.path().join(SIMILAR_BUGS_FILE);
        fs::write(
            &index,
            r#"{
                "circom": [
                    { "Similar Bugs": ["x/y/a", "x/y/b", "x/z/c", "x/missing"], "Note": "ignored" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(update(dir.path(), &index).unwrap(), 3);
        let similar = |dir: &Path| {
            BugConfig::load(dir.join(CONFIG_FILE))
                .unwrap()
                .bug
                .similar_bugs
                .unwrap()
        };
        assert_eq!(similar(&a), ["x/y/b", "x/z/c", "x/missing"]);
        assert_eq!(similar(&b), ["x/y/a", "x/z/c", "x/missing"]);
        assert_eq!(similar(&c), ["x/y/a", "x/y/b", "x/missing"]);
        assert!(b.join("README.md").is_file());
    }

    #[test]
    fn test_update_keeps_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("circom/x/y/a");
        fs::create_dir_all(&a).unwrap();
        fs::write(
            a.join(CONFIG_FILE),
            r#"{ "A": { "Id": "x/y/a" }, "A2": { "Id": "x/y/a2", "Note": "kept" } }"#,
        )
        .unwrap();
        write_bug(dir.path(), "circom/x/y/b", true);
        let index = dir.path().join(SIMILAR_BUGS_FILE);
        fs::write(&index, r#"{ "circom": [{ "Similar Bugs": ["x/y/a", "x/y/b"] }] }"#).unwrap();

        assert_eq!(update(dir.path(), &index).unwrap(), 2);
        let saved: serde_json::Value =
            serde_json::from_slice(&fs::read(a.join(CONFIG_FILE)).unwrap()).unwrap();
        assert_eq!(saved["A"]["Similar Bugs"], serde_json::json!(["x/y/b"]));
        assert_eq!(saved["A2"], serde_json::json!({ "Id": "x/y/a2", "Note": "kept" }));
    }

    #[test]
    fn test_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        assert!(update(dir.path(), dir.path().join(SIMILAR_BUGS_FILE)).is_err());
    }
}
