//! The per-bug metadata record stored in `zkbugs_config.json`.
//!
//! A config file is a JSON object with a single key, the title of the bug, mapping to the bug
//! record itself:
//! ```json
//! {
//!     "Underconstrained Points in Montgomery2Edwards": {
//!         "Id": "...",
//!         "DSL": "Circom",
//!         ...
//!     }
//! }
//! ```

use anyhow::Error;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// The name of the file describing a bug, present in every bug directory.
pub const CONFIG_FILE: &str = "zkbugs_config.json";

/// The commands every record carries, in the order they are written.
pub const COMMANDS: [&str; 6] = [
    "Setup Environment",
    "Reproduce",
    "Compile and Preprocess",
    "Positive Test",
    "Find Exploit",
    "Clean",
];

/// The source kind used for bugs found in audit reports.
pub const AUDIT_REPORT: &str = "Audit Report";

/// A single vulnerability record.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Bug {
    #[serde(rename = "Id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Path", deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(rename = "Project", deserialize_with = "null_as_default")]
    pub project: String,
    #[serde(rename = "Commit", deserialize_with = "null_as_default")]
    pub commit: String,
    #[serde(rename = "Fix Commit", deserialize_with = "null_as_default")]
    pub fix_commit: String,
    #[serde(rename = "DSL", deserialize_with = "null_as_default")]
    pub dsl: String,
    #[serde(rename = "Vulnerability", deserialize_with = "null_as_default")]
    pub vulnerability: String,
    #[serde(rename = "Impact", deserialize_with = "null_as_default")]
    pub impact: String,
    #[serde(rename = "Root Cause", deserialize_with = "null_as_default")]
    pub root_cause: String,
    /// Whether the bug has a working reproduction script.
    ///
    /// Records which predate this flag are assumed to be reproduced.
    #[serde(rename = "Reproduced")]
    pub reproduced: bool,
    #[serde(rename = "Location")]
    pub location: Location,
    #[serde(rename = "Source")]
    pub source: Source,
    #[serde(rename = "Commands")]
    pub commands: Commands,
    #[serde(rename = "Short Description of the Vulnerability", deserialize_with = "null_as_default")]
    pub vulnerability_description: String,
    #[serde(rename = "Short Description of the Exploit", deserialize_with = "null_as_default")]
    pub exploit_description: String,
    #[serde(rename = "Proposed Mitigation", deserialize_with = "null_as_default")]
    pub proposed_mitigation: String,
    /// Paths (relative to the DSL directory) of bugs with the same root cause.
    #[serde(rename = "Similar Bugs", skip_serializing_if = "Option::is_none")]
    pub similar_bugs: Option<Vec<String>>,
    /// Fields this crate does not interpret, kept so that rewriting a record never loses data.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Bug {
    fn default() -> Self {
        Self {
            id: String::new(),
            path: String::new(),
            project: String::new(),
            commit: String::new(),
            fix_commit: String::new(),
            dsl: String::new(),
            vulnerability: String::new(),
            impact: String::new(),
            root_cause: String::new(),
            reproduced: true,
            location: Location::default(),
            source: Source::default(),
            commands: Commands::default(),
            vulnerability_description: String::new(),
            exploit_description: String::new(),
            proposed_mitigation: String::new(),
            similar_bugs: None,
            extra: Map::new(),
        }
    }
}

/// Where in the vulnerable project the bug lives.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Location {
    #[serde(rename = "Path", deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(rename = "Function", deserialize_with = "null_as_default")]
    pub function: String,
    /// A line number or range; older records store this as a number, newer ones as a string.
    #[serde(rename = "Line")]
    pub line: Value,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            path: String::new(),
            function: String::new(),
            line: Value::String(String::new()),
        }
    }
}

/// Where the bug was reported, keyed by the kind of source.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Source(pub Map<String, Value>);

impl Source {
    /// A source pointing at a finding in an audit report.
    pub fn audit_report(source_link: impl Into<String>, bug_id: impl Into<String>) -> Self {
        let mut report = Map::new();
        report.insert("Source Link".into(), Value::String(source_link.into()));
        report.insert("Bug ID".into(), Value::String(bug_id.into()));
        let mut source = Map::new();
        source.insert(AUDIT_REPORT.into(), Value::Object(report));
        Self(source)
    }

    /// The audit report finding this bug came from, if any.
    pub fn report(&self) -> Option<AuditReport> {
        let report = self.0.get(AUDIT_REPORT)?.as_object()?;
        Some(AuditReport {
            source_link: report.get("Source Link").map(text).unwrap_or_default(),
            bug_id: report.get("Bug ID").map(text).unwrap_or_default(),
        })
    }

    /// Iterate over source kinds and their attributes, in order.
    pub fn kinds(&self) -> impl Iterator<Item = (&str, Vec<(&str, String)>)> {
        self.0.iter().map(|(kind, attrs)| {
            let attrs = match attrs {
                Value::Object(attrs) => attrs
                    .iter()
                    .map(|(name, value)| (name.as_str(), text(value)))
                    .collect(),
                _ => vec![],
            };
            (kind.as_str(), attrs)
        })
    }
}

/// A finding in an audit report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    pub source_link: String,
    pub bug_id: String,
}

/// Shell commands for working with the bug, keyed by purpose.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Commands(pub Map<String, Value>);

impl Commands {
    /// The standard set of commands, all empty.
    pub fn empty() -> Self {
        Self(
            COMMANDS
                .iter()
                .map(|name| (name.to_string(), Value::String(String::new())))
                .collect(),
        )
    }

    /// Iterate over `(name, command)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> {
        self.0.iter().map(|(name, cmd)| (name.as_str(), text(cmd)))
    }
}

/// A `zkbugs_config.json` file: a bug record and its title.
#[derive(Clone, Debug, PartialEq)]
pub struct BugConfig {
    pub title: String,
    pub bug: Bug,
    /// Any further top-level entries, which are not interpreted but are written back unchanged.
    pub rest: Map<String, Value>,
}

impl BugConfig {
    pub fn new(title: impl Into<String>, bug: Bug) -> Self {
        Self {
            title: title.into(),
            bug,
            rest: Map::new(),
        }
    }

    /// Read a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|err| Error::msg(format!("unable to read {}: {err}", path.display())))?;
        Self::parse(&bytes)
            .map_err(|err| Error::msg(format!("{} is malformed: {err}", path.display())))
    }

    /// Parse the contents of a config file.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let (title, bug, rest) = split_entries(bytes)?;
        Ok(Self {
            title,
            bug: serde_json::from_value(bug)?,
            rest,
        })
    }

    /// The config as it is stored on disk.
    pub fn to_json(&self) -> Result<Value, Error> {
        let mut entries = Map::new();
        entries.insert(self.title.clone(), serde_json::to_value(&self.bug)?);
        for (title, entry) in &self.rest {
            // A duplicate of the primary title would overwrite the record we just wrote.
            if *title != self.title {
                entries.insert(title.clone(), entry.clone());
            }
        }
        Ok(Value::Object(entries))
    }

    /// Write the config to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let mut json = serde_json::to_string_pretty(&self.to_json()?)?;
        json.push('\n');
        fs::write(path, json)
            .map_err(|err| Error::msg(format!("unable to write {}: {err}", path.display())))
    }

    pub fn is_reproduced(&self) -> bool {
        self.bug.reproduced
    }
}

/// Split a config file into the title and raw contents of its first entry, and the other entries.
///
/// Only the first entry describes the bug; a warning is logged if there are others.
fn split_entries(bytes: &[u8]) -> Result<(String, Value, Map<String, Value>), Error> {
    let mut entries = serde_json::from_slice::<Map<String, Value>>(bytes)?.into_iter();
    let (title, entry) = entries
        .next()
        .ok_or_else(|| Error::msg("config has no entries"))?;
    let rest = entries.collect::<Map<_, _>>();
    if !rest.is_empty() {
        tracing::warn!(
            "config has {} entries, only the first is used",
            rest.len() + 1
        );
    }
    Ok((title, entry, rest))
}

/// The title and record of a config file exactly as stored, without interpreting any fields.
pub fn load_raw(path: impl AsRef<Path>) -> Result<(String, Map<String, Value>), Error> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .map_err(|err| Error::msg(format!("unable to read {}: {err}", path.display())))?;
    let (title, entry, _) = split_entries(&bytes)
        .map_err(|err| Error::msg(format!("{} is malformed: {err}", path.display())))?;
    match entry {
        Value::Object(record) => Ok((title, record)),
        _ => Err(Error::msg(format!(
            "{} is malformed: the record is not an object",
            path.display()
        ))),
    }
}

/// Deserialize a field which some records set to `null`, treating `null` like a missing value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Render a JSON scalar the way it appears in prose: strings without quotes, null as nothing.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        v => v.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_record() {
        let config = BugConfig::parse(br#"{ "Some Bug": { "Id": "a/b", "DSL": "Circom" } }"#)
            .unwrap();
        assert_eq!(config.title, "Some Bug");
        assert_eq!(config.bug.id, "a/b");
        assert_eq!(config.bug.dsl, "Circom");
        // Records without the flag count as reproduced.
        assert!(config.is_reproduced());
        assert_eq!(config.bug.location.line, json!(""));
        assert!(config.bug.similar_bugs.is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(BugConfig::parse(b"{}").is_err());
        assert!(BugConfig::parse(b"[]").is_err());
        assert!(BugConfig::parse(b"not json").is_err());
        assert!(BugConfig::parse(br#"{ "Bug": { "Reproduced": "yes" } }"#).is_err());
    }

    #[test]
    fn test_unknown_fields_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            serde_json::to_vec(&json!({
                "Bug": {
                    "Id": "x",
                    "Reproduced": false,
                    "Location": { "Path": "a.circom", "Function": "f", "Line": 12 },
                    "Extra Field": { "nested": [1, 2] },
                }
            }))
            .unwrap(),
        )
        .unwrap();

        let config = BugConfig::load(&path).unwrap();
        assert!(!config.is_reproduced());
        assert_eq!(text(&config.bug.location.line), "12");
        config.save(&path).unwrap();

        let saved: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["Bug"]["Extra Field"], json!({ "nested": [1, 2] }));
        assert_eq!(saved["Bug"]["Location"]["Line"], json!(12));
        assert_eq!(saved["Bug"]["Reproduced"], json!(false));
        assert!(saved["Bug"].get("Similar Bugs").is_none());
    }

    #[test]
    fn test_extra_entries_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{ "First": { "Id": "a", "DSL": "Circom" }, "Second": { "Id": "b", "Odd": [1] } }"#,
        )
        .unwrap();

        // The first entry is the bug.
        let mut config = BugConfig::load(&path).unwrap();
        assert_eq!(config.title, "First");
        assert_eq!(config.bug.id, "a");
        assert_eq!(config.rest.len(), 1);

        config.bug.fix_commit = "abc".into();
        config.save(&path).unwrap();
        let saved: Map<String, Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.keys().collect::<Vec<_>>(), ["First", "Second"]);
        assert_eq!(saved["First"]["Fix Commit"], json!("abc"));
        assert_eq!(saved["Second"], json!({ "Id": "b", "Odd": [1] }));
    }

    #[test]
    fn test_null_strings() {
        let config = BugConfig::parse(
            br#"{ "Bug": {
                "Id": "x",
                "Fix Commit": null,
                "Proposed Mitigation": null,
                "Location": { "Path": null, "Function": "f", "Line": null }
            } }"#,
        )
        .unwrap();
        assert_eq!(config.bug.id, "x");
        assert_eq!(config.bug.fix_commit, "");
        assert_eq!(config.bug.proposed_mitigation, "");
        assert_eq!(config.bug.location.path, "");
        assert_eq!(config.bug.location.function, "f");
        assert_eq!(text(&config.bug.location.line), "");
    }

    #[test]
    fn test_load_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{ "T": { "Id": "c", "Fix Commit": null }, "U": {} }"#).unwrap();
        let (title, record) = load_raw(&path).unwrap();
        assert_eq!(title, "T");
        assert_eq!(Value::Object(record), json!({ "Id": "c", "Fix Commit": null }));

        fs::write(&path, r#"{ "T": "not a record" }"#).unwrap();
        assert!(load_raw(&path).is_err());
    }

    #[test]
    fn test_field_order_on_disk() {
        let config = BugConfig::new("T", Bug::default());
        let json = serde_json::to_string(&config.to_json().unwrap()).unwrap();
        let id = json.find("\"Id\"").unwrap();
        let dsl = json.find("\"DSL\"").unwrap();
        let mitigation = json.find("\"Proposed Mitigation\"").unwrap();
        assert!(id < dsl && dsl < mitigation);
    }

    #[test]
    fn test_audit_report_source() {
        let source = Source::audit_report("https://example.com/report.pdf", "ZK-01");
        assert_eq!(
            source.report(),
            Some(AuditReport {
                source_link: "https://example.com/report.pdf".into(),
                bug_id: "ZK-01".into(),
            })
        );
        let kinds = source.kinds().collect::<Vec<_>>();
        assert_eq!(kinds.len(), 1);
        assert_eq!(kinds[0].0, AUDIT_REPORT);
        assert_eq!(kinds[0].1[1], ("Bug ID", "ZK-01".to_string()));

        let issue: Source = serde_json::from_value(json!({ "Bug Tracker": { "Url": "u" } })).unwrap();
        assert_eq!(issue.report(), None);
    }

    #[test]
    fn test_empty_commands() {
        let names = Commands::empty()
            .iter()
            .map(|(name, cmd)| {
                assert!(cmd.is_empty());
                name.to_string()
            })
            .collect::<Vec<_>>();
        assert_eq!(names, COMMANDS);
    }
}
