//! Human-readable documentation rendered from bug records.
//!
//! Every bug directory gets a `README.md` describing the bug, and the repository root gets a
//! `BUGS.md` collecting all of them under a table of contents.

use crate::config::{text, Bug, BugConfig, CONFIG_FILE};
use crate::dataset::{Dataset, README};
use anyhow::Error;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Where the dataset is browsable online.
pub const DATASET_URL: &str = "https://github.com/zksecurity/zkbugs/tree/main/dataset";

/// Render the README for a single bug.
pub fn render_readme(bug: &Bug) -> String {
    // Writing to a `String` cannot fail.
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", bug.vulnerability);
    let _ = writeln!(md, "* Id: {}", bug.id);
    let _ = writeln!(md, "* Project: {}", bug.project);
    let _ = writeln!(md, "* Commit: {}", bug.commit);
    let _ = writeln!(md, "* Fix Commit: {}", bug.fix_commit);
    let _ = writeln!(md, "* DSL: {}", bug.dsl);
    let _ = writeln!(md, "* Vulnerability: {}", bug.vulnerability);
    md.push_str("* Location\n");
    let _ = writeln!(md, "  - Path: {}", bug.location.path);
    let _ = writeln!(md, "  - Function: {}", bug.location.function);
    let _ = writeln!(md, "  - Line: {}", text(&bug.location.line));
    for (kind, attrs) in bug.source.kinds() {
        let _ = writeln!(md, "* Source: {kind}");
        for (name, value) in attrs {
            let _ = writeln!(md, "  - {name}: {value}");
        }
    }
    md.push_str("* Commands\n");
    for (name, cmd) in bug.commands.iter() {
        let _ = writeln!(md, "  - {name}: `{cmd}`");
    }
    md.push_str("\n## Short Description of the Vulnerability\n\n");
    md.push_str(&bug.vulnerability_description);
    md.push_str("\n\n## Short Description of the Exploit\n\n");
    md.push_str(&bug.exploit_description);
    md.push_str("\n\n## Proposed Mitigation\n\n");
    md.push_str(&bug.proposed_mitigation);
    md.push('\n');
    md
}

/// Regenerate `README.md` in the bug directory `dir`.
pub fn write_readme(dir: impl AsRef<Path>) -> Result<PathBuf, Error> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::msg(format!(
            "the directory '{}' does not exist",
            dir.display()
        )));
    }
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.is_file() {
        return Err(Error::msg(format!(
            "the config file does not exist in the directory '{}'",
            dir.display()
        )));
    }
    let config = BugConfig::load(&config_path)?;
    let readme = dir.join(README);
    fs::write(&readme, render_readme(&config.bug))?;
    tracing::info!("README.md created in {} for '{}'", dir.display(), config.title);
    Ok(readme)
}

/// Demote every Markdown header by two levels.
pub fn bump_headers(md: &str) -> String {
    static HEADERS: OnceLock<Regex> = OnceLock::new();
    let headers = HEADERS.get_or_init(|| Regex::new(r"(?m)^(#+)").expect("static regex"));
    headers.replace_all(md, "##${1}").into_owned()
}

/// Render `BUGS.md`: a table of contents followed by the README of every documented bug.
///
/// Only bugs which already have a `README.md` are included.
pub fn render_bugs_md(dataset: &Dataset, base_url: &str) -> Result<String, Error> {
    let mut by_dsl = BTreeMap::<String, Vec<_>>::new();
    for bug in dataset.bugs() {
        if bug.readme().is_file() {
            by_dsl.entry(bug.dsl().to_string()).or_default().push(bug);
        }
    }

    let mut toc = String::from("# Table of Contents\n\n");
    for (dsl, bugs) in &by_dsl {
        let _ = writeln!(toc, "- [{dsl}]({base_url}/{dsl})");
        for bug in bugs {
            let _ = writeln!(toc, "    - [{}]({base_url}/{})", bug.id, bug.id);
        }
    }

    let mut content = String::new();
    for (dsl, bugs) in &by_dsl {
        let _ = write!(content, "# {dsl}\n\n");
        for bug in bugs {
            let _ = write!(content, "## {}\n\n", bug.id);
            let readme = fs::read_to_string(bug.readme()).map_err(|err| {
                Error::msg(format!("unable to read {}: {err}", bug.readme().display()))
            })?;
            content.push_str(&bump_headers(&readme));
            content.push_str("\n\n");
        }
    }

    Ok(format!("{toc}\n{content}"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Commands, Source};
    use crate::testing::write_bug;
    use serde_json::json;

    fn sample() -> Bug {
        let mut commands = Commands::empty();
        commands
            .0
            .insert("Reproduce".into(), json!("bash zkbugs_exploit.sh"));
        let mut bug = Bug {
            id: "iden3/circomlib/veridise_bug".into(),
            project: "https://github.com/iden3/circomlib".into(),
            commit: "abc".into(),
            fix_commit: "def".into(),
            dsl: "Circom".into(),
            vulnerability: "Under-Constrained".into(),
            source: Source::audit_report("https://example.com/r.pdf", "V-1"),
            commands,
            vulnerability_description: "The output is not constrained.".into(),
            exploit_description: "Pick any output.".into(),
            proposed_mitigation: "Constrain the output.".into(),
            ..Default::default()
        };
        bug.location.path = "circuits/a.circom".into();
        bug.location.function = "Main".into();
        bug.location.line = json!(42);
        bug
    }

    #[test]
    fn test_render_readme() {
        let expected = "\
# Under-Constrained

* Id: iden3/circomlib/veridise_bug
* Project: https://github.com/iden3/circomlib
* Commit: abc
* Fix Commit: def
* DSL: Circom
* Vulnerability: Under-Constrained
* Location
  - Path: circuits/a.circom
  - Function: Main
  - Line: 42
* Source: Audit Report
  - Source Link: https://example.com/r.pdf
  - Bug ID: V-1
* Commands
  - Setup Environment: ``
  - Reproduce: `bash zkbugs_exploit.sh`
  - Compile and Preprocess: ``
  - Positive Test: ``
  - Find Exploit: ``
  - Clean: ``

## Short Description of the Vulnerability

The output is not constrained.

## Short Description of the Exploit

Pick any output.

## Proposed Mitigation

Constrain the output.
";
        assert_eq!(render_readme(&sample()), expected);
    }

    #[test]
    fn test_write_readme() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_readme(dir.path().join("missing")).is_err());
        assert!(write_readme(dir.path()).is_err());

        let bug = write_bug(dir.path(), "circom/a/b/bug", true);
        let readme = write_readme(&bug).unwrap();
        let md = fs::read_to_string(readme).unwrap();
        assert!(md.starts_with("# Under-Constrained\n"));
        assert!(md.contains("* Id: a/b/bug\n"));
        assert!(md.contains("Description of bug."));
    }

    #[test]
    fn test_bump_headers() {
        assert_eq!(
            bump_headers("# Title\ntext with # inside\n## Sub\n"),
            "### Title\ntext with # inside\n#### Sub\n"
        );
    }

    #[test]
    fn test_render_bugs_md() {
        let dir = tempfile::tempdir().unwrap();
        let documented = write_bug(dir.path(), "halo2/x/y/second", true);
        let other = write_bug(dir.path(), "circom/a/b/first", true);
        write_bug(dir.path(), "circom/a/b/undocumented", true);
        fs::write(documented.join(README), "# Second\n\nBody.\n").unwrap();
        fs::write(other.join(README), "# First\n").unwrap();

        let md = render_bugs_md(&Dataset::open(dir.path()), "https://h/dataset").unwrap();
        let expected = "\
# Table of Contents

- [circom](https://h/dataset/circom)
    - [circom/a/b/first](https://h/dataset/circom/a/b/first)
- [halo2](https://h/dataset/halo2)
    - [halo2/x/y/second](https://h/dataset/halo2/x/y/second)

# circom

## circom/a/b/first

### First


# halo2

## halo2/x/y/second

### Second

Body.


";
        assert_eq!(md, expected);
    }
}
