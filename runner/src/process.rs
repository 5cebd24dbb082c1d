//! Running external tools.

use anyhow::Error;
use regex::Regex;
use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

/// How often to check whether a child with a deadline has exited.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured output of a finished process.
#[derive(Clone, Debug)]
pub struct Output {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Run `cmd` to completion, capturing its output, unless it takes longer than `timeout`.
///
/// A child which misses the deadline is killed and [`None`] is returned.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Option<Output>, Error> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes while we wait, so a chatty child can't block on a full pipe.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            if let Err(err) = child.kill() {
                tracing::warn!("unable to kill process {}: {err}", child.id());
            }
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    };

    let join = |reader: Option<thread::JoinHandle<String>>| {
        reader
            .map(|reader| reader.join().unwrap_or_default())
            .unwrap_or_default()
    };
    Ok(Some(Output {
        status,
        stdout: join(stdout),
        stderr: join(stderr),
    }))
}

fn drain(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = vec![];
        if let Err(err) = pipe.read_to_end(&mut buf) {
            tracing::warn!("error reading process output: {err}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Run `cmd` to completion, feeding it `input` on standard input.
///
/// The child's output goes to our terminal if `verbose`, and is discarded otherwise. Returns
/// whether the child exited successfully.
pub fn run_quiet(cmd: &mut Command, input: Option<&str>, verbose: bool) -> Result<bool, Error> {
    let output = || {
        if verbose {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    };
    let mut child = cmd
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(output())
        .stderr(output())
        .spawn()?;
    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        // The child may exit without reading its input; that is its business.
        if let Err(err) = stdin.write_all(input.as_bytes()) {
            tracing::debug!("unable to write to child stdin: {err}");
        }
    }
    Ok(child.wait()?.success())
}

/// Remove ANSI terminal escape sequences (colors, cursor movement) from `text`.
pub fn strip_ansi(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| {
        Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static regex")
    });
    ansi.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(
            strip_ansi("\x1b[1m\x1b[32mThe circuit is properly constrained\x1b[0m\n"),
            "The circuit is properly constrained\n"
        );
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_run_with_timeout() {
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]),
            Duration::from_secs(10),
        )
        .unwrap()
        .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[test]
    fn test_run_with_timeout_expires() {
        let start = Instant::now();
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "exec sleep 30"]),
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(output.is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_run_quiet() {
        assert!(run_quiet(
            Command::new("sh").args(["-c", "read line; test \"$line\" = abc"]),
            Some("abc\n"),
            false
        )
        .unwrap());
        assert!(!run_quiet(Command::new("sh").args(["-c", "exit 1"]), None, false).unwrap());
        assert!(run_quiet(&mut Command::new("this-program-does-not-exist"), None, false).is_err());
    }
}
