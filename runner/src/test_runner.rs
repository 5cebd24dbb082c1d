#![cfg(test)]

//! This module runs reproduction test cases against a scratch dataset.
//!
//! Each test case is a bug directory with a config, an optional exploit script and an optional
//! install command, together with the status we expect [reproduce](crate::reproduce::reproduce) to
//! report for it. The runner builds all of the bugs in a temporary dataset, reproduces each one
//! through the same path the `reproduce` command takes, and prints a line per case.
//!
//! Use `cargo test -p runner` to run these tests. The exploit scripts need `bash`.

use crate::reproduce::{self, Status, Summary};
use ansi_term::Color;
use anyhow::Error;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::Path;
use zkbugs::dataset::{Dataset, Selection};
use zkbugs::testing::write_bug;

#[test]
fn reproduction_test_cases() -> Result<(), Error> {
    zkbugs::init_logging();

    let dir = tempfile::tempdir()?;
    let cases = test_cases();
    for case in &cases {
        case.build(dir.path())?;
    }
    let dataset = Dataset::open(dir.path());

    let results = cases
        .iter()
        .map(|case| case.run(&dataset))
        .collect::<Vec<_>>();
    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        return Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))));
    }

    // Running the whole dataset at once must agree with the individual cases.
    let mut expected = Summary::default();
    for case in &cases {
        expected.record(case.expected);
    }
    let bugs = dataset.select(&Selection::All)?;
    let summary = reproduce::reproduce_all(
        &bugs,
        &reproduce::Options {
            verbose: false,
            install: None,
        },
    );
    // Cases with a failing install command pass when nothing is installed.
    let install_cases = cases
        .iter()
        .filter(|case| case.install == Some("exit 1"))
        .count();
    expected.success += install_cases;
    expected.fail -= install_cases;
    if summary != expected {
        return Err(Error::msg(format!(
            "expected summary:\n{expected}actual summary:\n{summary}"
        )));
    }

    println!("All test cases passed.");
    Ok(())
}

fn test_cases() -> Vec<TestCase> {
    vec![
        TestCase {
            id: "circom/a/exploits/exits_zero",
            reproduced: true,
            script: Some("exit 0"),
            install: None,
            expected: Status::Success,
        },
        TestCase {
            id: "circom/a/exploits/exits_nonzero",
            reproduced: true,
            script: Some("echo 'constraint holds' >&2\nexit 1"),
            install: None,
            expected: Status::Fail,
        },
        TestCase {
            id: "circom/a/exploits/reads_entropy",
            reproduced: true,
            script: Some("read entropy\n[ ${#entropy} -eq 10 ] && [[ $entropy =~ ^[a-z0-9]+$ ]]"),
            install: None,
            expected: Status::Success,
        },
        TestCase {
            id: "halo2/b/exploits/runs_in_bug_dir",
            reproduced: true,
            script: Some("test -f zkbugs_config.json"),
            install: None,
            expected: Status::Success,
        },
        TestCase {
            id: "circom/a/exploits/uses_installed",
            reproduced: true,
            script: Some("test -f installed"),
            install: Some("touch installed"),
            expected: Status::Success,
        },
        TestCase {
            id: "circom/a/exploits/install_fails",
            reproduced: true,
            script: Some("exit 0"),
            install: Some("exit 1"),
            expected: Status::Fail,
        },
        TestCase {
            id: "gnark/c/exploits/not_reproducible",
            reproduced: false,
            script: Some("exit 1"),
            install: None,
            expected: Status::Skip,
        },
        TestCase {
            id: "gnark/c/exploits/missing_script",
            reproduced: true,
            script: None,
            install: None,
            expected: Status::Fail,
        },
    ]
}

#[derive(Clone, Debug)]
struct TestCase {
    id: &'static str,
    reproduced: bool,
    script: Option<&'static str>,
    install: Option<&'static str>,
    expected: Status,
}

impl TestCase {
    fn build(&self, root: &Path) -> Result<(), Error> {
        let dir = write_bug(root, self.id, self.reproduced);
        if let Some(script) = self.script {
            fs::write(
                dir.join(zkbugs::dataset::EXPLOIT_SCRIPT),
                format!("#!/bin/bash\n{script}\n"),
            )?;
        }
        Ok(())
    }

    fn run(&self, dataset: &Dataset) -> TestResult {
        TestResult {
            name: self.id,
            expected: self.expected,
            outcome: self.do_test(dataset),
        }
    }

    fn do_test(&self, dataset: &Dataset) -> Result<Status, Error> {
        let bug = dataset
            .select(&Selection::Single(self.id.into()))?
            .remove(0);
        let opt = reproduce::Options {
            verbose: false,
            install: self.install.map(String::from),
        };
        Ok(reproduce::reproduce(&bug, &opt))
    }
}

/// What happened to one case: the status it was reproduced with, or why it could not be run.
struct TestResult {
    name: &'static str,
    expected: Status,
    outcome: Result<Status, Error>,
}

impl TestResult {
    fn failed(&self) -> bool {
        !matches!(self.outcome, Ok(status) if status == self.expected)
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} (expect {}): ", self.name, self.expected)?;
        match &self.outcome {
            Ok(status) if *status == self.expected => write!(f, "{}", Color::Green.paint("OK")),
            Ok(status) => write!(f, "{} {status}", Color::Red.paint("GOT")),
            Err(err) => write!(f, "{}\n{err}", Color::Red.paint("ERROR")),
        }
    }
}
