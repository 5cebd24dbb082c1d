//! Reproduce bugs by running their exploit scripts.

use crate::process::run_quiet;
use anyhow::Error;
use rand::seq::SliceRandom;
use std::fmt::{self, Display, Formatter};
use std::process::Command;
use strum::Display;
use zkbugs::dataset::BugDir;

/// The result of trying to reproduce one bug.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Fail,
    /// The bug is known not to be reproducible.
    Skip,
}

/// How to run reproductions.
#[derive(Clone, Debug)]
pub struct Options {
    /// Show the output of dependency installation and exploit scripts.
    pub verbose: bool,
    /// Shell command installing an exploit's dependencies, run in the bug directory first.
    pub install: Option<String>,
}

/// Characters used for entropy.
const ENTROPY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random text drawn uniformly from `[a-z0-9]`.
///
/// Some exploit scripts perform a trusted setup, which asks for entropy on standard input.
pub fn entropy(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .filter_map(|_| ENTROPY_CHARS.choose(&mut rng))
        .map(|&c| char::from(c))
        .collect()
}

/// Try to reproduce `bug`.
pub fn reproduce(bug: &BugDir, opt: &Options) -> Status {
    match try_reproduce(bug, opt) {
        Ok(status) => status,
        Err(err) => {
            tracing::error!("unable to reproduce {}: {err}", bug.id);
            Status::Fail
        }
    }
}

fn try_reproduce(bug: &BugDir, opt: &Options) -> Result<Status, Error> {
    let config = bug.config()?;
    if !config.is_reproduced() {
        tracing::info!("{} is not reproducible, skipping", bug.id);
        return Ok(Status::Skip);
    }
    let script = bug.exploit_script();
    if !script.is_file() {
        return Err(Error::msg(format!(
            "{} not found in {}",
            zkbugs::dataset::EXPLOIT_SCRIPT,
            bug.path.display()
        )));
    }

    if let Some(install) = &opt.install {
        tracing::info!("installing dependencies for {}", bug.name());
        let installed = run_quiet(
            Command::new("sh")
                .arg("-c")
                .arg(install)
                .current_dir(&bug.path),
            None,
            opt.verbose,
        )?;
        if !installed {
            return Err(Error::msg(format!(
                "failed to install dependencies for {}",
                bug.name()
            )));
        }
    }

    tracing::info!("reproducing bug {}", bug.name());
    let input = format!("{}\n", entropy(10));
    let reproduced = run_quiet(
        Command::new("bash")
            .arg(zkbugs::dataset::EXPLOIT_SCRIPT)
            .current_dir(&bug.path),
        Some(&input),
        opt.verbose,
    )?;
    Ok(if reproduced {
        Status::Success
    } else {
        Status::Fail
    })
}

/// Counts of reproduction results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub success: usize,
    pub fail: usize,
    pub skip: usize,
}

impl Summary {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Success => self.success += 1,
            Status::Fail => self.fail += 1,
            Status::Skip => self.skip += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.fail + self.skip
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let total = self.total();
        writeln!(f, "Total bugs: {total}")?;
        writeln!(
            f,
            "Successfully reproduced {} out of {total} bugs",
            self.success
        )?;
        writeln!(f, "Skipped {} out of {total} bugs", self.skip)?;
        writeln!(f, "Errors {} out of {total} bugs", self.fail)
    }
}

/// Reproduce each of `bugs` in turn.
pub fn reproduce_all(bugs: &[BugDir], opt: &Options) -> Summary {
    let mut summary = Summary::default();
    for bug in bugs {
        let status = reproduce(bug, opt);
        tracing::info!("{}: {status}", bug.id);
        summary.record(status);
    }
    summary
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_entropy() {
        let e = entropy(10);
        assert_eq!(e.len(), 10);
        assert!(e
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(entropy(32), entropy(32));
    }

    #[test]
    fn test_entropy_is_uniform() {
        // Each of the 36 characters is expected 1000 times; a digit is far rarer when letters
        // are favored, e.g. by lowercasing mixed-case text.
        let sample = entropy(36_000);
        for c in ['0', '7', 'a', 'z'] {
            let count = sample.chars().filter(|&x| x == c).count();
            assert!((800..1200).contains(&count), "{c} appeared {count} times");
        }
    }

    #[test]
    fn test_summary() {
        let mut summary = Summary::default();
        for status in [Status::Success, Status::Fail, Status::Skip, Status::Success] {
            summary.record(status);
        }
        assert_eq!(summary.total(), 4);
        assert_eq!(
            summary.to_string(),
            "Total bugs: 4\n\
             Successfully reproduced 2 out of 4 bugs\n\
             Skipped 1 out of 4 bugs\n\
             Errors 1 out of 4 bugs\n"
        );
    }
}
