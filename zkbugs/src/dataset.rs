//! Discovery of bug directories in the dataset tree.
//!
//! The dataset is laid out as
//!
//! ```text
//! dataset/
//!     <dsl>/
//!         <owner>/
//!             <repo>/
//!                 <bug>/
//!                     zkbugs_config.json
//!                     zkbugs_exploit.sh
//!                     README.md
//!                     circuits/
//! ```
//!
//! but the only thing that makes a directory a bug is the presence of `zkbugs_config.json`, so
//! discovery walks the whole tree.

use crate::config::{BugConfig, CONFIG_FILE};
use anyhow::Error;
use clap::Args;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

/// Name of the reproduction script in a bug directory.
pub const EXPLOIT_SCRIPT: &str = "zkbugs_exploit.sh";

/// Name of the rendered documentation in a bug directory.
pub const README: &str = "README.md";

/// Directories that never contain bugs and can be very large.
const IGNORED_DIRS: [&str; 3] = ["node_modules", "target", ".git"];

/// Options locating the repository and its dataset.
#[derive(Clone, Debug, Args)]
pub struct DatasetOptions {
    /// Root of the zkbugs repository.
    #[clap(long, env = "ZKBUGS_ROOT", name = "ROOT", default_value = ".")]
    pub root: PathBuf,

    /// The dataset directory [default: ROOT/dataset].
    #[clap(long, env = "ZKBUGS_DATASET_DIR", name = "DATASET")]
    pub dataset: Option<PathBuf>,
}

impl DatasetOptions {
    pub fn dataset_dir(&self) -> PathBuf {
        self.dataset
            .clone()
            .unwrap_or_else(|| self.root.join("dataset"))
    }

    /// Open the dataset, failing if it does not exist.
    pub fn open(&self) -> Result<Dataset, Error> {
        let dir = self.dataset_dir();
        if !dir.is_dir() {
            return Err(Error::msg(format!(
                "dataset directory not found at: {}",
                dir.display()
            )));
        }
        Ok(Dataset::open(dir))
    }
}

/// A circuit language or proving framework with its own directory in the dataset.
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Dsl {
    Arkworks,
    Bellperson,
    Cairo,
    Circom,
    Gnark,
    Halo2,
    Pil,
    Plonky3,
    Risc0,
}

/// Human-readable title for a DSL directory name.
pub fn dsl_title(name: &str) -> String {
    match name {
        "halo2" => "Halo2".into(),
        "pil" => "PIL".into(),
        "plonky3" => "Plonky3".into(),
        "risc0" => "Risc0".into(),
        name => {
            let mut chars = name.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        }
    }
}

/// Which bugs a batch operation applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The single bug whose ID or path contains the pattern.
    Single(String),
    /// Every bug for one DSL.
    Dsl(Dsl),
    All,
}

/// The dataset rooted at some directory.
#[derive(Clone, Debug)]
pub struct Dataset {
    root: PathBuf,
}

impl Dataset {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All bug directories in the dataset, sorted by ID.
    pub fn bugs(&self) -> Vec<BugDir> {
        let mut bugs = vec![];
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match dir.read_dir() {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::error!("unable to read directory {}: {err}", dir.display());
                    continue;
                }
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        tracing::error!("unable to read directory {}: {err}", dir.display());
                        continue;
                    }
                };
                let is_dir = entry.file_type().map(|ty| ty.is_dir()).unwrap_or(false);
                if !is_dir {
                    continue;
                }
                if IGNORED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()) {
                    continue;
                }
                stack.push(entry.path());
            }
            if dir != self.root && dir.join(CONFIG_FILE).is_file() {
                bugs.push(BugDir::new(&self.root, dir));
            }
        }
        bugs.sort_by(|a, b| a.id.cmp(&b.id));
        bugs
    }

    /// The bugs matching `selection`.
    ///
    /// A [`Selection::Single`] pattern is matched against both the ID and the full path of each
    /// bug, and must match exactly one bug.
    pub fn select(&self, selection: &Selection) -> Result<Vec<BugDir>, Error> {
        let bugs = self.bugs();
        match selection {
            Selection::All => Ok(bugs),
            Selection::Dsl(dsl) => {
                let dsl = dsl.to_string();
                Ok(bugs.into_iter().filter(|bug| bug.dsl() == dsl).collect())
            }
            Selection::Single(pattern) => {
                let matches = bugs
                    .into_iter()
                    .filter(|bug| {
                        bug.id.contains(pattern.as_str())
                            || bug.path.to_string_lossy().contains(pattern.as_str())
                    })
                    .collect::<Vec<_>>();
                match matches.len() {
                    0 => Err(Error::msg(format!("no bug found with ID {pattern}"))),
                    1 => Ok(matches),
                    _ => Err(Error::msg(format!(
                        "multiple bugs found with ID {pattern}, please provide a more specific ID:\n{}",
                        matches
                            .iter()
                            .map(|bug| format!("- {}", bug.id))
                            .collect::<Vec<_>>()
                            .join("\n")
                    ))),
                }
            }
        }
    }
}

/// A directory in the dataset describing one bug.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BugDir {
    /// Location of the directory.
    pub path: PathBuf,
    /// Path of the directory relative to the dataset root, `/`-separated.
    pub id: String,
}

impl BugDir {
    fn new(root: &Path, path: PathBuf) -> Self {
        let id = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Self { path, id }
    }

    /// The DSL directory this bug lives under.
    pub fn dsl(&self) -> &str {
        self.id.split('/').next().unwrap_or_default()
    }

    /// The name of the bug directory itself.
    pub fn name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or_default()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE)
    }

    pub fn config(&self) -> Result<BugConfig, Error> {
        BugConfig::load(self.config_path())
    }

    pub fn exploit_script(&self) -> PathBuf {
        self.path.join(EXPLOIT_SCRIPT)
    }

    pub fn readme(&self) -> PathBuf {
        self.path.join(README)
    }

    pub fn circuits(&self) -> PathBuf {
        self.path.join("circuits")
    }

    /// The top-level Circom circuit, for Circom bugs.
    pub fn main_circuit(&self) -> PathBuf {
        self.circuits().join("circuit.circom")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{write_bug, write_config};
    use std::fs;

    fn sample_dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_bug(dir.path(), "circom/iden3/circomlib/veridise_bug_one", true);
        write_bug(dir.path(), "circom/iden3/circomlib/veridise_bug_two", false);
        write_bug(dir.path(), "halo2/zcash/orchard/bug_three", true);
        // Not a bug: no config.
        fs::create_dir_all(dir.path().join("gnark/consensys/gnark/notes")).unwrap();
        // Dependencies installed by a reproduction are never searched.
        write_config(
            &dir.path().join("circom/iden3/circomlib/veridise_bug_one/node_modules/pkg"),
            "Hidden",
            Default::default(),
        );
        dir
    }

    #[test]
    fn test_discovery() {
        let dir = sample_dataset();
        let dataset = Dataset::open(dir.path());
        let ids = dataset
            .bugs()
            .into_iter()
            .map(|bug| bug.id)
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            [
                "circom/iden3/circomlib/veridise_bug_one",
                "circom/iden3/circomlib/veridise_bug_two",
                "halo2/zcash/orchard/bug_three",
            ]
        );
    }

    #[test]
    fn test_bug_dir_accessors() {
        let dir = sample_dataset();
        let bug = Dataset::open(dir.path())
            .select(&Selection::Single("bug_three".into()))
            .unwrap()
            .remove(0);
        assert_eq!(bug.dsl(), "halo2");
        assert_eq!(bug.name(), "bug_three");
        assert_eq!(bug.exploit_script(), bug.path.join(EXPLOIT_SCRIPT));
        assert_eq!(bug.config().unwrap().title, "bug_three");
    }

    #[test]
    fn test_select() {
        let dir = sample_dataset();
        let dataset = Dataset::open(dir.path());

        assert_eq!(dataset.select(&Selection::All).unwrap().len(), 3);
        assert_eq!(dataset.select(&Selection::Dsl(Dsl::Circom)).unwrap().len(), 2);
        assert!(dataset
            .select(&Selection::Dsl(Dsl::Cairo))
            .unwrap()
            .is_empty());

        let err = dataset
            .select(&Selection::Single("veridise".into()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("multiple bugs"), "{err}");
        assert!(err.contains("veridise_bug_two"), "{err}");

        let err = dataset
            .select(&Selection::Single("nope".into()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("no bug found"), "{err}");
    }

    #[test]
    fn test_select_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dataset");
        write_bug(&root, "circom/iden3/circomlib/bug", true);
        write_bug(&root, "gnark/consensys/gnark/bug", true);
        let dataset = Dataset::open(&root);

        let bugs = dataset
            .select(&Selection::Single("dataset/gnark/consensys/gnark/bug".into()))
            .unwrap();
        assert_eq!(bugs.len(), 1);
        assert_eq!(bugs[0].id, "gnark/consensys/gnark/bug");
    }

    #[test]
    fn test_dsl_names() {
        assert_eq!("plonky3".parse::<Dsl>().unwrap(), Dsl::Plonky3);
        assert_eq!(Dsl::Halo2.to_string(), "halo2");
        assert!("Circom ".parse::<Dsl>().is_err());

        assert_eq!(dsl_title("halo2"), "Halo2");
        assert_eq!(dsl_title("pil"), "PIL");
        assert_eq!(dsl_title("risc0"), "Risc0");
        assert_eq!(dsl_title("circom"), "Circom");
        assert_eq!(dsl_title("gnark"), "Gnark");
        assert_eq!(dsl_title(""), "");
    }

    #[test]
    fn test_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let opt = DatasetOptions {
            root: dir.path().into(),
            dataset: None,
        };
        assert_eq!(opt.dataset_dir(), dir.path().join("dataset"));
        assert!(opt.open().is_err());
        fs::create_dir(dir.path().join("dataset")).unwrap();
        assert!(opt.open().is_ok());
    }
}
