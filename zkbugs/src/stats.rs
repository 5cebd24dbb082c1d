//! Per-DSL counts of bugs in the dataset.

use crate::dataset::{dsl_title, Dataset};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Bug counts by DSL, for all bugs and for reproduced bugs only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub all: BTreeMap<String, usize>,
    pub reproduced: BTreeMap<String, usize>,
}

impl Stats {
    pub fn collect(dataset: &Dataset) -> Self {
        let mut stats = Self::default();
        for bug in dataset.bugs() {
            *stats.all.entry(bug.dsl().to_string()).or_default() += 1;
            let reproduced = match bug.config() {
                Ok(config) => config.is_reproduced(),
                Err(err) => {
                    tracing::warn!("{err}, counting {} as reproduced", bug.id);
                    true
                }
            };
            if reproduced {
                *stats.reproduced.entry(bug.dsl().to_string()).or_default() += 1;
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.all.values().sum()
    }

    pub fn total_reproduced(&self) -> usize {
        self.reproduced.values().sum()
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let total = self.total();
        let reproduced = self.total_reproduced();
        writeln!(
            f,
            "This repo currently includes {total} vulnerabilities across DSLs."
        )?;
        if reproduced != total {
            writeln!(f, "Reproduced: {reproduced} / {total}")?;
        }
        writeln!(f)?;
        writeln!(f, "By DSL (all):")?;
        for (dsl, count) in &self.all {
            writeln!(f, "- {} ({count})", dsl_title(dsl))?;
        }
        if reproduced != total {
            writeln!(f, "\nBy DSL (reproduced only):")?;
            for (dsl, count) in &self.reproduced {
                writeln!(f, "- {} ({count})", dsl_title(dsl))?;
            }
        }
        Ok(())
    }
}
