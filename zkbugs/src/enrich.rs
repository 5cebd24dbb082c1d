//! Fill in descriptions and locations of imported bugs from their audit reports.
//!
//! The language model is asked three questions about each finding: a short description, the
//! recommended fix and the location of the bug. The answers are written back into the record.
//! They should always be reviewed by hand before being committed.

use crate::config::{BugConfig, Location};
use crate::import::REPORTS_URL;
use crate::llm::{query, Llm, Retry};
use anyhow::Error;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const DESCRIPTION_INSTRUCTION: &str = "Summarize the bug in 1-3 short sentences in a plain text \
    format. Do not use JSON or markdown.";
const MITIGATION_INSTRUCTION: &str = "Extract the recommended fix concisely (if available). Limit \
    it to 1-2 sentences in plain text format. Do not use JSON or markdown.";
const LOCATION_INSTRUCTION: &str = "Find the file path, function name, and line number for the \
    bug if available. Return in plain text format as 'Path: XYZ, Function: ABC, Line: 123'. If \
    the function or line is not specified, leave them empty. Do not use JSON or markdown.";

/// The path, relative to the repository root, of a report committed to this repository.
pub fn report_path(source_link: &str) -> Option<&str> {
    source_link.strip_prefix(REPORTS_URL)
}

/// Extract the text of a report.
///
/// PDFs are converted with `pdftotext` (from poppler), which must be installed. Anything else is
/// read as plain text.
pub fn report_text(path: impl AsRef<Path>) -> Result<String, Error> {
    let path = path.as_ref();
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    let text = if is_pdf {
        let output = Command::new("pdftotext")
            .arg("-layout")
            .arg(path)
            .arg("-")
            .output()
            .map_err(|err| Error::msg(format!("unable to run pdftotext: {err}")))?;
        if !output.status.success() {
            return Err(Error::msg(format!(
                "pdftotext failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        fs::read_to_string(path)
            .map_err(|err| Error::msg(format!("unable to read {}: {err}", path.display())))?
    };
    if text.trim().is_empty() {
        return Err(Error::msg(format!("no text in {}", path.display())));
    }
    Ok(text)
}

/// Parse a location answer of the form `Path: XYZ, Function: ABC, Line: 123`.
///
/// Function and line answers the model marks as "not specified" are left empty.
pub fn parse_location(answer: &str) -> Location {
    let mut location = Location::default();
    for part in answer.split(',') {
        let value = || {
            part.split_once(':')
                .map(|(_, value)| value.trim().to_string())
                .unwrap_or_default()
        };
        let unspecified = part.to_lowercase().contains("not specified");
        if part.contains("Path:") {
            location.path = value();
        } else if part.contains("Function:") && !unspecified {
            location.function = value();
        } else if part.contains("Line:") && !unspecified {
            location.line = Value::String(value());
        }
    }
    location
}

/// What happened to one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    Skipped(String),
}

/// Enrich the record at `config_path` from its audit report.
///
/// Report links are resolved relative to `root`, the root of the repository.
pub async fn enrich<L: Llm + ?Sized>(
    llm: &L,
    root: &Path,
    config_path: &Path,
    retry: Retry,
) -> Result<Outcome, Error> {
    tracing::info!("processing {}", config_path.display());
    let mut config = BugConfig::load(config_path)?;
    let Some(report) = config.bug.source.report() else {
        return Ok(Outcome::Skipped("not an audit report".into()));
    };
    let Some(rel_path) = report_path(&report.source_link) else {
        return Ok(Outcome::Skipped(format!(
            "audit report {} is not stored in this repository",
            report.source_link
        )));
    };
    let path = root.join(rel_path);
    if !path.is_file() {
        return Ok(Outcome::Skipped(format!(
            "audit report {} not found for {}",
            path.display(),
            config.title
        )));
    }
    let text = report_text(&path)?;
    let bug_id = &report.bug_id;

    let description_prompt = format!(
        "Find the description of the bug '{bug_id}' in the following report and summarize it \
         concisely:\n\n{text}"
    );
    let mitigation_prompt =
        format!("Find the recommended fix for the bug '{bug_id}' in the report:\n\n{text}");
    let location_prompt = format!(
        "Find the file path, function name, and line number for the bug '{bug_id}' in the \
         report:\n\n{text}"
    );
    let (description, mitigation, location) = futures::join!(
        query(llm, DESCRIPTION_INSTRUCTION, &description_prompt, retry),
        query(llm, MITIGATION_INSTRUCTION, &mitigation_prompt, retry),
        query(llm, LOCATION_INSTRUCTION, &location_prompt, retry),
    );
    let location = parse_location(&location.unwrap_or_default());

    tracing::info!(?location, "location");
    tracing::info!(?description, "short description");
    tracing::info!(?mitigation, "proposed mitigation");

    config.bug.location = location;
    config.bug.vulnerability_description = description.unwrap_or_default();
    config.bug.proposed_mitigation = mitigation.unwrap_or_default();
    config.save(config_path)?;
    tracing::info!("updated {}", config_path.display());
    Ok(Outcome::Updated)
}

/// Result of enriching a batch of records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Display for EnrichSummary {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "Updated {} records ({} skipped, {} failed)",
            self.updated, self.skipped, self.failed
        )
    }
}

/// Enrich every record listed, one config path per line, in the file `list`.
pub async fn enrich_list<L: Llm + ?Sized>(
    llm: &L,
    root: &Path,
    list: &Path,
    retry: Retry,
) -> Result<EnrichSummary, Error> {
    let paths = fs::read_to_string(list)
        .map_err(|err| Error::msg(format!("unable to read {}: {err}", list.display())))?;
    let mut summary = EnrichSummary::default();
    for path in paths.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let path = PathBuf::from(path);
        if !path.is_file() {
            tracing::error!("JSON file not found: {}", path.display());
            summary.failed += 1;
            continue;
        }
        match enrich(llm, root, &path, retry).await {
            Ok(Outcome::Updated) => summary.updated += 1,
            Ok(Outcome::Skipped(reason)) => {
                tracing::warn!("skipping {}: {reason}", path.display());
                summary.skipped += 1;
            }
            Err(err) => {
                tracing::error!("{err}");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}
