//! Helpers for building scratch datasets in tests.

use crate::config::{Bug, BugConfig, Commands, Source, CONFIG_FILE};
use crate::llm::{Completion, Llm};
use anyhow::Error;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Write a config file into `dir`, creating the directory if necessary.
pub fn write_config(dir: &Path, title: &str, bug: Bug) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(CONFIG_FILE);
    BugConfig::new(title, bug).save(&path).unwrap();
    path
}

/// A plausible record for the bug at `id` (a path relative to the dataset root).
pub fn sample_bug(id: &str, reproduced: bool) -> Bug {
    let dsl = id.split('/').next().unwrap_or_default();
    let name = id.rsplit('/').next().unwrap_or_default();
    Bug {
        id: id.split_once('/').map(|(_, id)| id).unwrap_or(id).into(),
        path: format!("dataset/{id}"),
        dsl: dsl.into(),
        vulnerability: "Under-Constrained".into(),
        impact: "Soundness".into(),
        root_cause: "Missing Input Constraints".into(),
        reproduced,
        source: Source::audit_report("https://example.com/report.pdf", name),
        commands: Commands::empty(),
        vulnerability_description: format!("Description of {name}."),
        ..Default::default()
    }
}

/// Create a bug directory at `root/id` containing a sample config titled after the directory.
pub fn write_bug(root: &Path, id: &str, reproduced: bool) -> PathBuf {
    let dir = root.join(id);
    let name = id.rsplit('/').next().unwrap_or_default();
    write_config(&dir, name, sample_bug(id, reproduced));
    dir
}

/// A language model which answers from a closure, counting calls.
pub struct MockLlm {
    respond: Box<dyn Fn(&str, &str) -> Result<Completion, Error> + Send + Sync>,
    calls: AtomicUsize,
}

impl MockLlm {
    pub fn new(
        respond: impl Fn(&str, &str) -> Result<Completion, Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        }
    }

    /// A model which gives the listed responses in order, then errors.
    pub fn sequence(responses: Vec<Result<Completion, Error>>) -> Self {
        let responses = Mutex::new(VecDeque::from(responses));
        Self::new(move |_, _| {
            responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::msg("no more responses")))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Llm for MockLlm {
    async fn complete(&self, instruction: &str, prompt: &str) -> Result<Completion, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(instruction, prompt)
    }
}
