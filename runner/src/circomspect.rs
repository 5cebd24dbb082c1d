//! Run the circomspect static analyzer over every Circom bug.
//!
//! For each bug with a `circuits/` directory, the files included by `circuits/circuit.circom` are
//! analyzed individually, and the results are collected into a Markdown report alongside the
//! bug's short description.

use regex::Regex;
use std::collections::VecDeque;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use zkbugs::dataset::Dataset;

/// Written in place of a missing or empty vulnerability description.
const NO_DESCRIPTION: &str = "No description available";

/// Paths included by a Circom source file.
pub fn includes(source: &str) -> Vec<String> {
    static INCLUDE: OnceLock<Regex> = OnceLock::new();
    let include =
        INCLUDE.get_or_init(|| Regex::new(r#"include\s*"(.+?)""#).expect("static regex"));
    include
        .captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Find a file named `name` anywhere under `dir`, preferring shallower matches.
pub fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut queue = VecDeque::from([dir.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let Ok(entries) = dir.read_dir() else {
            continue;
        };
        let mut entries = entries.filter_map(Result::ok).collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                queue.push_back(path);
            } else if entry.file_name().to_string_lossy() == name {
                return Some(path);
            }
        }
    }
    None
}

/// Run circomspect on one file, returning everything it printed.
fn analyze(program: &str, file: &Path) -> String {
    match Command::new(program).arg(file).output() {
        Ok(output) => format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
        Err(err) => format!("Error running {program}: {err}\n"),
    }
}

/// Analyze the dataset with `program` (the circomspect executable), producing a Markdown report.
pub fn report(dataset: &Dataset, program: &str, verbose: bool) -> String {
    let mut md = String::from("# Circomspect Analysis Results\n\n");
    let mut found = false;
    for bug in dataset.bugs() {
        let circuits = bug.circuits();
        if !circuits.is_dir() {
            continue;
        }
        found = true;
        let _ = write!(md, "## {}\n\n", bug.id);

        let description = match bug.config() {
            Ok(config) => config.bug.vulnerability_description,
            Err(err) => {
                tracing::error!("{err}");
                String::new()
            }
        };
        let description = if description.trim().is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            description
        };
        let _ = write!(
            md,
            "### Short Description of the Vulnerability\n\n{description}\n\n"
        );

        let main = bug.main_circuit();
        let source = match fs::read_to_string(&main) {
            Ok(source) => source,
            Err(err) => {
                tracing::debug!("skipping {}: {err}", main.display());
                continue;
            }
        };
        for include in includes(&source) {
            let name = Path::new(&include)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| include.clone());
            let Some(path) = find_file(&circuits, &name) else {
                tracing::warn!(
                    "included file {name} not found in {}",
                    circuits.display()
                );
                continue;
            };
            let mut output = analyze(program, &path);
            if !output.ends_with('\n') {
                output.push('\n');
            }
            let _ = write!(
                md,
                "### Circomspect Output for {name}\n\n```\n{output}```\n\n"
            );
            if verbose {
                println!("Circomspect output for {}/circuits/{name}:", bug.id);
                println!("{output}");
                println!("{}", "-".repeat(80));
            } else {
                tracing::info!("circomspect for {}/circuits/{name} done", bug.id);
            }
        }
    }
    if !found {
        let msg = format!(
            "No circuit.circom or zkbugs_config.json found in {}",
            dataset.root().display()
        );
        tracing::error!("{msg}");
        let _ = write!(md, "## Error\n\n{msg}\n\n");
    }
    md
}
