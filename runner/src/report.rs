//! Convert hand-written analysis write-ups into CSV tables.
//!
//! After running the analyzers, the results for each bug are classified by hand in a Markdown
//! document. These functions extract the classification so it can be tabulated.

use anyhow::Error;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use strum::{Display, EnumString};

/// Which analyzer a write-up is about.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Tool {
    Circomspect,
    Picus,
}

/// One bug in the circomspect write-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CircomspectRow {
    pub bug_title: String,
    pub success: String,
    pub evaluation: String,
    pub intended_pass: String,
}

const CIRCOMSPECT_HEADER: [&str; 4] = [
    "bug title",
    "success",
    "evaluation",
    "intended circomspect analysis pass",
];

/// Extract the entries of the circomspect write-up.
///
/// Each entry looks like
/// ```text
/// ### 3. circom/<bug path>
/// ...
/// **Success**: No, but expected
/// **Evaluation**: ...
/// **Intended Circomspect analysis pass**: ...
/// ```
pub fn parse_circomspect(md: &str) -> Vec<CircomspectRow> {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    let entry = ENTRY.get_or_init(|| {
        Regex::new(concat!(
            r"(?s)###\s+(\d+\.\s+circom/[^\n]+)\n.*?",
            r"\*\*Success\*\*:\s*(Yes|No|No, but expected)\n.*?",
            r"\*\*Evaluation\*\*:\s*(.+?)\n.*?",
            r"\*\*Intended Circomspect analysis pass\*\*:\s*(.+?)\n",
        ))
        .expect("static regex")
    });
    entry
        .captures_iter(md)
        .map(|caps| CircomspectRow {
            bug_title: caps[1].trim().into(),
            success: caps[2].trim().into(),
            evaluation: caps[3].trim().into(),
            intended_pass: caps[4].trim().into(),
        })
        .collect()
}

/// One bug in the Picus write-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PicusRow {
    pub bug_title: String,
    pub success: String,
    pub evaluation: String,
}

const PICUS_HEADER: [&str; 3] = ["bug title", "success", "evaluation"];

/// The Picus write-up sorts bugs into these sections.
const PICUS_CATEGORIES: [(&str, &str, &str); 5] = [
    (
        "Category 1. Successfully Detected the Vulnerability",
        "Yes",
        "Picus found a bug and the bug is the same as the actual bug",
    ),
    (
        "Category 2. Unsupported Vulnerability",
        "No",
        "The bug is not underconstrained bug so Picus does not support it",
    ),
    (
        "Category 3. Timeout",
        "No",
        "Picus does not halt after running for 100 seconds and it hits timeout limit",
    ),
    (
        "Category 4. Incorrectly Reported as Properly Constrained",
        "No",
        "Picus outputs 'The circuit is properly constrained' but the circuit contains a bug",
    ),
    (
        "Category 5. Failure",
        "No",
        "Picus outputs 'Cannot determine whether the circuit is properly constrained'",
    ),
];

/// Extract the entries of the Picus write-up.
///
/// Each `### <category>` section lists bugs as `<n>. circom/<bug path>`; the classification of
/// each bug is implied by its section.
pub fn parse_picus(md: &str) -> Vec<PicusRow> {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    let entry =
        ENTRY.get_or_init(|| Regex::new(r"\d+\.\s+(circom/.+)").expect("static regex"));
    let mut rows = vec![];
    let mut section: Option<(&str, &str)> = None;
    for line in md.lines() {
        if let Some(title) = line.strip_prefix("### ") {
            let title = title.trim();
            section = Some(
                PICUS_CATEGORIES
                    .iter()
                    .find(|(category, _, _)| *category == title)
                    .map(|(_, success, evaluation)| (*success, *evaluation))
                    .unwrap_or(("Unknown", "Unknown")),
            );
        } else if line.starts_with('#') {
            section = None;
        } else if let Some((success, evaluation)) = section {
            if let Some(caps) = entry.captures(line) {
                rows.push(PicusRow {
                    bug_title: caps[1].trim().into(),
                    success: success.into(),
                    evaluation: evaluation.into(),
                });
            }
        }
    }
    rows
}

/// Write `rows` to a CSV file at `path` with the given header.
///
/// The header is written even if there are no rows.
fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<(), Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| Error::msg(format!("unable to create {}: {err}", path.display())))?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Convert the write-up for `tool` at `md` into a CSV table at `out`.
///
/// Returns the number of rows written.
pub fn convert(tool: Tool, md: &Path, out: &Path) -> Result<usize, Error> {
    let content = std::fs::read_to_string(md)
        .map_err(|err| Error::msg(format!("unable to read {}: {err}", md.display())))?;
    match tool {
        Tool::Circomspect => {
            let rows = parse_circomspect(&content);
            write_csv(out, &CIRCOMSPECT_HEADER, &rows)?;
            Ok(rows.len())
        }
        Tool::Picus => {
            let rows = parse_picus(&content);
            write_csv(out, &PICUS_HEADER, &rows)?;
            Ok(rows.len())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    const CIRCOMSPECT_MD: &str = "\
# Circomspect analysis

## Summary

### 1. circom/iden3/circomlib/veridise_bug_one

**Success**: Yes
**Evaluation**: Circomspect flags the unconstrained signal.
**Intended Circomspect analysis pass**: Unconstrained signal

### 2. circom/zkopru/leastauthority_bug_two

Some notes first.

**Success**: No, but expected
**Evaluation**: The warning is drowned out.
**Intended Circomspect analysis pass**: Under-constrained signal

### Totals

Not an entry.
";

    const PICUS_MD: &str = "\
# Picus analysis

### Category 1. Successfully Detected the Vulnerability

1. circom/iden3/circomlib/veridise_bug_one
2. circom/a/b/bug_two

### Category 3. Timeout

1. circom/c/d/bug_three

### Something Else

1. circom/e/f/bug_four

## Conclusion

1. circom/g/h/not_in_a_category
";

    #[test]
    fn test_parse_circomspect() {
        assert_eq!(
            parse_circomspect(CIRCOMSPECT_MD),
            [
                CircomspectRow {
                    bug_title: "1. circom/iden3/circomlib/veridise_bug_one".into(),
                    success: "Yes".into(),
                    evaluation: "Circomspect flags the unconstrained signal.".into(),
                    intended_pass: "Unconstrained signal".into(),
                },
                CircomspectRow {
                    bug_title: "2. circom/zkopru/leastauthority_bug_two".into(),
                    success: "No, but expected".into(),
                    evaluation: "The warning is drowned out.".into(),
                    intended_pass: "Under-constrained signal".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_picus() {
        let rows = parse_picus(PICUS_MD);
        let summary = rows
            .iter()
            .map(|row| (row.bug_title.as_str(), row.success.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            [
                ("circom/iden3/circomlib/veridise_bug_one", "Yes"),
                ("circom/a/b/bug_two", "Yes"),
                ("circom/c/d/bug_three", "No"),
                ("circom/e/f/bug_four", "Unknown"),
            ]
        );
        assert_eq!(rows[2].evaluation, PICUS_CATEGORIES[2].2);
        assert_eq!(rows[3].evaluation, "Unknown");
    }

    #[test]
    fn test_convert() {
        let dir = tempfile::tempdir().unwrap();
        let md = dir.path().join("picus_analysis.md");
        let csv = dir.path().join("picus_analysis.csv");
        fs::write(&md, PICUS_MD).unwrap();
        assert_eq!(convert(Tool::Picus, &md, &csv).unwrap(), 4);
        let table = fs::read_to_string(&csv).unwrap();
        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("bug title,success,evaluation"));
        assert_eq!(
            lines.next(),
            Some(
                "circom/iden3/circomlib/veridise_bug_one,Yes,\
                 Picus found a bug and the bug is the same as the actual bug"
            )
        );

        // An empty write-up still gets a header.
        fs::write(&md, "# Nothing yet\n").unwrap();
        let csv = dir.path().join("circomspect_analysis.csv");
        assert_eq!(convert(Tool::Circomspect, &md, &csv).unwrap(), 0);
        assert_eq!(
            fs::read_to_string(&csv).unwrap(),
            "bug title,success,evaluation,intended circomspect analysis pass\n"
        );
    }

    #[test]
    fn test_tool_names() {
        assert_eq!("picus".parse::<Tool>().unwrap(), Tool::Picus);
        assert_eq!(Tool::Circomspect.to_string(), "circomspect");
    }
}
