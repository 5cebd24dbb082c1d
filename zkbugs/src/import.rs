//! Import bugs from a spreadsheet of audit findings.
//!
//! Each row of the CSV export becomes a new bug directory containing a skeleton
//! `zkbugs_config.json`. The generated records are marked as not reproduced; descriptions,
//! locations and commands are filled in later, by hand or by [`enrich`](crate::enrich).

use crate::config::{Bug, BugConfig, Commands, Location, Source, CONFIG_FILE};
use anyhow::Error;
use regex::Regex;
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use surf::Url;

/// Where audit reports committed to this repository are served from.
pub const REPORTS_URL: &str = "https://github.com/zksecurity/zkbugs/blob/main/";

/// One row of the findings spreadsheet.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Row {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ZK Framework (Circuit only)")]
    pub framework: String,
    #[serde(rename = "Source Code", default)]
    pub source_code: String,
    #[serde(rename = "Fix", default)]
    pub fix: String,
    #[serde(rename = "Vulnerability", default)]
    pub vulnerability: String,
    #[serde(rename = "Root Cause", default)]
    pub root_cause: String,
    #[serde(rename = "Impact", default)]
    pub impact: String,
    #[serde(rename = "Source Link", default)]
    pub source_link: String,
}

/// An entry in `reports/reports.json`, recording the audited commit for each report.
#[derive(Clone, Debug, Deserialize)]
struct ReportEntry {
    #[serde(rename = "File")]
    file: String,
    #[serde(rename = "Commit", default)]
    commit: String,
}

/// Index of audit reports stored in the repository.
#[derive(Clone, Debug, Default)]
pub struct Reports(Vec<ReportEntry>);

impl Reports {
    /// Load the report index.
    ///
    /// A missing index is not an error: commits are then left empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                "report index {} not found, commits will be left empty",
                path.display()
            );
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        let entries = serde_json::from_slice(&bytes)
            .map_err(|err| Error::msg(format!("{} is malformed: {err}", path.display())))?;
        Ok(Self(entries))
    }

    /// The audited commit for the report at `source_link`.
    pub fn commit(&self, source_link: &str) -> String {
        let file = source_link.replace("reports/", "");
        self.0
            .iter()
            .find(|report| report.file == file)
            .map(|report| report.commit.clone())
            .unwrap_or_default()
    }
}

/// The `owner/repo` part of a GitHub URL.
pub fn extract_project(url: &str) -> String {
    if !url.contains("github.com") {
        return String::new();
    }
    let Ok(url) = Url::parse(url) else {
        return String::new();
    };
    let parts = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default();
    if parts.len() >= 2 {
        format!("{}/{}", parts[0], parts[1])
    } else {
        String::new()
    }
}

/// The commit hash referenced by a GitHub fix URL.
pub fn extract_fix_commit(fix_url: &str) -> String {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"commit/([a-f0-9]{40})",
            r"commits/([a-f0-9]{40})",
            r"files#diff-([a-f0-9]+)",
        ]
        .into_iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    });
    patterns
        .iter()
        .find_map(|re| re.captures(fix_url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// The auditing firm, for reports stored under `reports/documents/<auditor>-...`.
pub fn extract_auditor(source_link: &str) -> String {
    let parts = source_link.split('/').collect::<Vec<_>>();
    if parts.len() >= 3 && parts[0] == "reports" && parts[1] == "documents" {
        parts[2].split('-').next().unwrap_or_default().into()
    } else {
        String::new()
    }
}

/// Turn a finding title into a directory name.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter_map(|c| match c {
            ' ' | '+' | '=' | '-' => Some('_'),
            '’' | '“' | '”' | '(' | ')' | '/' | '.' => None,
            c => Some(c),
        })
        .collect()
}

/// The location and contents of the record generated from one row.
#[derive(Clone, Debug)]
pub struct Imported {
    /// Path of the bug directory relative to the dataset root.
    pub dir: PathBuf,
    pub config: BugConfig,
}

/// Build the record for `row`.
pub fn record(row: &Row, reports: &Reports) -> Imported {
    let title = row.name.clone();
    let dsl = row.framework.trim();
    let source_code = row.source_code.trim();
    let fix = row.fix.trim();
    let source_link = row.source_link.trim();

    let mut project = extract_project(source_code);
    if project.is_empty() {
        project = extract_project(fix);
    }
    let auditor = extract_auditor(source_link);
    let with_auditor = |name: String| {
        if auditor.is_empty() {
            name
        } else {
            format!("{auditor}_{name}")
        }
    };
    let dir_name = with_auditor(sanitize_title(&title));
    let id_name = with_auditor(title.replace(' ', "_"));

    let dsl_dir = dsl.to_lowercase();
    let dir = [dsl_dir.as_str(), project.as_str(), dir_name.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<PathBuf>();
    let rel_path = [dsl_dir.as_str(), project.as_str(), dir_name.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let id = if project.is_empty() {
        id_name
    } else {
        format!("{project}/{id_name}")
    };
    let link = if auditor.is_empty() {
        source_link.to_string()
    } else {
        format!("{REPORTS_URL}{source_link}")
    };

    let bug = Bug {
        id,
        path: format!("dataset/{rel_path}"),
        project: format!("https://github.com/{project}"),
        commit: reports.commit(source_link),
        fix_commit: extract_fix_commit(fix),
        dsl: dsl.into(),
        vulnerability: row.vulnerability.trim().into(),
        impact: row.impact.trim().into(),
        root_cause: row.root_cause.trim().into(),
        reproduced: false,
        location: Location::default(),
        source: Source::audit_report(link, title.clone()),
        commands: Commands::empty(),
        ..Default::default()
    };
    Imported {
        dir,
        config: BugConfig::new(title, bug),
    }
}

/// Result of importing a spreadsheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub written: usize,
    pub skipped: usize,
}

impl Display for ImportSummary {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "Imported {} bugs ({} skipped)",
            self.written, self.skipped
        )
    }
}

/// Create a config for every row of the CSV file at `csv`.
///
/// Bugs which already have a config are skipped unless `force` is set.
pub fn import(
    csv: impl AsRef<Path>,
    dataset: impl AsRef<Path>,
    reports: &Reports,
    force: bool,
) -> Result<ImportSummary, Error> {
    let csv = csv.as_ref();
    let mut reader = csv::Reader::from_path(csv)
        .map_err(|err| Error::msg(format!("unable to open {}: {err}", csv.display())))?;
    let mut summary = ImportSummary::default();
    for (i, row) in reader.deserialize::<Row>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                tracing::error!("row {} of {} is malformed: {err}", i + 1, csv.display());
                summary.skipped += 1;
                continue;
            }
        };
        let imported = record(&row, reports);
        let dir = dataset.as_ref().join(&imported.dir);
        let path = dir.join(CONFIG_FILE);
        if path.exists() && !force {
            tracing::warn!("{} already exists, skipping", path.display());
            summary.skipped += 1;
            continue;
        }
        fs::create_dir_all(&dir)?;
        imported.config.save(&path)?;
        tracing::info!("saved config: {}", path.display());
        summary.written += 1;
    }
    Ok(summary)
}
