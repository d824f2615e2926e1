//! Shared helpers: external command execution and small numeric utilities.
//!
//! Everything that shells out (`ss`, `netstat`, `nvidia-smi`) goes through
//! the [`CommandRunner`] capability so collectors can be driven by canned
//! output in tests.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::CommandError;

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Runs an external program and returns its stdout.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`. Non-zero exit, a missing executable and a
    /// timeout are all errors.
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    CommandError::NotFound {
                        program: program.to_string(),
                    }
                } else {
                    CommandError::Spawn {
                        program: program.to_string(),
                        source,
                    }
                }
            })?;

        // Drain both pipes on their own threads so a large socket table
        // cannot fill the pipe buffer and stall the child.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(CommandError::TimedOut {
                            program: program.to_string(),
                            timeout_ms: self.timeout.as_millis() as u64,
                        });
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::Spawn {
                        program: program.to_string(),
                        source,
                    });
                }
            }
        };

        let out = stdout.map(join_drain).unwrap_or_default();
        let err = stderr.map(join_drain).unwrap_or_default();

        if !status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&err).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Files and numbers
// ---------------------------------------------------------------------------

pub(crate) fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Read a small text file, trimmed. `None` when missing or empty.
pub(crate) fn read_trimmed(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let v = raw.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

/// Round to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
pub(crate) const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_decimals() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.000_95, 4), 0.001);
        assert_eq!(round_to(2.5, 0), 3.0);
    }

    #[test]
    fn read_trimmed_missing_and_blank() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank");
        std::fs::write(&blank, "  \n").unwrap();
        let value = dir.path().join("value");
        std::fs::write(&value, "coretemp\n").unwrap();

        assert_eq!(read_trimmed(&dir.path().join("missing")), None);
        assert_eq!(read_trimmed(&blank), None);
        assert_eq!(read_trimmed(&value).as_deref(), Some("coretemp"));
    }

    #[test]
    fn missing_program_is_not_found() {
        let runner = SystemCommandRunner::default();
        let err = runner
            .run("hostwatch-definitely-not-a-real-binary", &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFound { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn captures_stdout_of_successful_command() {
        let runner = SystemCommandRunner::default();
        let out = runner.run("sh", &["-c", "echo hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    #[cfg(unix)]
    fn non_zero_exit_is_failed() {
        let runner = SystemCommandRunner::default();
        let err = runner.run("sh", &["-c", "echo oops >&2; exit 3"]).unwrap_err();
        match err {
            CommandError::Failed { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn slow_command_times_out() {
        let runner = SystemCommandRunner::new(Duration::from_millis(50));
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn killed_child_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 5", pid_file.display());

        let runner = SystemCommandRunner::new(Duration::from_millis(300));
        let err = runner.run("sh", &["-c", &script]).unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));

        // A zombie would keep its /proc entry until waited on.
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let proc_dir = format!("/proc/{}", pid.trim());
        assert!(!Path::new(&proc_dir).exists(), "{proc_dir} still present");
    }
}
