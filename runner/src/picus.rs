//! Run the Picus underconstraint checker over every Circom bug, using its Docker image.

use crate::process::{run_with_timeout, strip_ansi};
use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use zkbugs::dataset::{BugDir, Dataset};

/// Where the repository is mounted inside the Picus container.
const MOUNT: &str = "/Picus/zkbugs/";

/// How to run Picus.
#[derive(Clone, Debug)]
pub struct Options {
    /// The Docker executable.
    pub docker: String,
    /// The Picus image to run.
    pub image: String,
    /// Give up on a circuit after this long.
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            docker: "docker".into(),
            image: "veridise/picus:v1.0.3".into(),
            timeout: Duration::from_secs(100),
        }
    }
}

/// Run Picus on the main circuit of `bug`, returning its output.
///
/// `root` is the repository root, which is mounted into the container. Failures of any kind are
/// reported in the returned text rather than as errors, so they show up in the report.
pub fn run(root: &Path, bug: &BugDir, opt: &Options) -> String {
    let container = format!("picus_{}", bug.name());
    let output = match circuit_in_container(root, bug) {
        Ok(circuit) => {
            tracing::info!("running Picus for {}", bug.id);
            let mut cmd = Command::new(&opt.docker);
            cmd.args(["run", "--rm", "--name", container.as_str(), "-v"])
                .arg(format!("{}:{MOUNT}", root.display()))
                .arg(&opt.image)
                .arg("./run-picus")
                .arg(circuit);
            match run_with_timeout(&mut cmd, opt.timeout) {
                Ok(Some(output)) if output.status.success() => output.combined(),
                Ok(Some(output)) => format!(
                    "Warning: Picus exited with status {}\n\n{}",
                    output
                        .status
                        .code()
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "unknown".into()),
                    output.combined()
                ),
                Ok(None) => format!(
                    "Error: Picus execution timed out after {} seconds for {}",
                    opt.timeout.as_secs(),
                    bug.path.display()
                ),
                Err(err) => format!("Error running Picus for {}: {err}", bug.path.display()),
            }
        }
        Err(err) => format!("Error running Picus for {}: {err}", bug.path.display()),
    };

    // `--rm` should take care of this, but not if we killed the client on timeout.
    if let Err(err) = Command::new(&opt.docker)
        .args(["rm", "-f", container.as_str()])
        .output()
    {
        tracing::warn!("unable to remove container {container}: {err}");
    }
    strip_ansi(&output)
}

/// The path of the bug's main circuit as seen from inside the container.
fn circuit_in_container(root: &Path, bug: &BugDir) -> Result<String, anyhow::Error> {
    let root = fs::canonicalize(root)?;
    let circuit = fs::canonicalize(bug.main_circuit())?;
    let rel = circuit.strip_prefix(&root).map_err(|_| {
        anyhow::Error::msg(format!(
            "{} is not inside the repository {}",
            circuit.display(),
            root.display()
        ))
    })?;
    Ok(format!("{MOUNT}{}", rel.display()))
}

/// Run Picus on every bug with a main Circom circuit, producing a Markdown report.
pub fn report(root: &Path, dataset: &Dataset, opt: &Options) -> String {
    let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let mut md = String::from("# Picus Analysis Results\n\n");
    for bug in dataset.bugs() {
        if !bug.main_circuit().is_file() {
            continue;
        }
        let output = run(&root, &bug, opt);
        let _ = write!(md, "## {}\n\n```\n{output}\n```\n\n", bug.id);
    }
    md
}
