//! Flatten the whole dataset into a single JSON document.

use crate::config::load_raw;
use crate::dataset::Dataset;
use anyhow::Error;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Every record in the dataset as stored, each with its title added under `"title"`.
pub fn collect(dataset: &Dataset) -> Vec<Value> {
    dataset
        .bugs()
        .into_iter()
        .filter_map(|bug| match load_raw(bug.config_path()) {
            Ok((title, mut record)) => {
                record.insert("title".into(), Value::String(title));
                Some(Value::Object(record))
            }
            Err(err) => {
                tracing::error!("skipping {}: {err}", bug.id);
                None
            }
        })
        .collect()
}

/// Write collected records to `path`.
pub fn write(path: impl AsRef<Path>, records: &[Value]) -> Result<(), Error> {
    let path = path.as_ref();
    let mut json = serde_json::to_string_pretty(records)?;
    json.push('\n');
    fs::write(path, json)
        .map_err(|err| Error::msg(format!("unable to write {}: {err}", path.display())))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::write_bug;

    #[test]
    fn test_collect() {
        let dir = tempfile::tempdir().unwrap();
        write_bug(dir.path(), "circom/a/b/first", true);
        write_bug(dir.path(), "gnark/c/d/second", false);
        let broken = dir.path().join("gnark/c/d/broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("zkbugs_config.json"), "{").unwrap();

        let records = collect(&Dataset::open(dir.path()));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], "first");
        assert_eq!(records[0]["DSL"], "circom");
        assert_eq!(records[1]["title"], "second");
        assert_eq!(records[1]["Reproduced"], false);

        let out = dir.path().join("out.json");
        write(&out, &records).unwrap();
        let written: Vec<Value> = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(written, records);
    }

    #[test]
    fn test_collect_sparse_records() {
        let dir = tempfile::tempdir().unwrap();
        let sparse = dir.path().join("circom/a/b/sparse");
        fs::create_dir_all(&sparse).unwrap();
        fs::write(
            sparse.join("zkbugs_config.json"),
            r#"{ "Sparse": { "Id": "c", "Fix Commit": null } }"#,
        )
        .unwrap();
        write_bug(dir.path(), "gnark/c/d/full", true);

        let records = collect(&Dataset::open(dir.path()));
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            serde_json::json!({ "Id": "c", "Fix Commit": null, "title": "Sparse" })
        );
        assert_eq!(records[1]["title"], "full");
    }
}
