use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Wall-clock budget for every `dump` subcommand.
pub const DUMP_TIMEOUT: Duration = Duration::from_secs(20);
/// Wall-clock budget for `version`.
pub const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What happened to a single toolchain invocation.
///
/// Only `Completed` carries output the callers are allowed to interpret; every
/// other variant degrades to a negative signal or a default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutput {
    /// Exited with status 0. Holds stdout and stderr interleaved.
    Completed(String),
    /// Exited with a non-zero status, or was killed by a signal (`code` is `None`).
    Failed { code: Option<i32>, output: String },
    /// Did not exit before the deadline and was killed.
    TimedOut,
    /// Could not be spawned at all.
    LaunchFailed(String),
}

impl ProbeOutput {
    pub fn into_text(self) -> Option<String> {
        match self {
            ProbeOutput::Completed(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Runs `program` with `args`, merging stdout and stderr, and kills it once
    /// `timeout` has elapsed.
    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> ProbeOutput;
}

/// Spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> ProbeOutput {
        let (mut reader, writer) = match std::io::pipe() {
            Ok(pipe) => pipe,
            Err(e) => return ProbeOutput::LaunchFailed(format!("pipe: {}", e)),
        };
        let stderr = match writer.try_clone() {
            Ok(stderr) => stderr,
            Err(e) => return ProbeOutput::LaunchFailed(format!("pipe: {}", e)),
        };

        // The temporary `Command` owns our copies of the write end; it is
        // dropped at the end of this statement so the reader sees EOF once the
        // child exits.
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return ProbeOutput::LaunchFailed(format!("{}: {}", program.display(), e));
            }
        };

        let (sender, drained) = mpsc::channel();
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            let _ = sender.send(buffer);
        });

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    // A background grandchild can keep the pipe open after the child exits.
                    let grace = deadline
                        .saturating_duration_since(Instant::now())
                        .max(POLL_INTERVAL);
                    let Ok(bytes) = drained.recv_timeout(grace) else {
                        log::debug!(
                            "`{} {}` exited but its output stayed open past {:?}",
                            program.display(),
                            args.join(" "),
                            timeout
                        );
                        return ProbeOutput::TimedOut;
                    };
                    let output = String::from_utf8_lossy(&bytes).into_owned();
                    return if status.success() {
                        ProbeOutput::Completed(output)
                    } else {
                        ProbeOutput::Failed {
                            code: status.code(),
                            output,
                        }
                    };
                }
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::debug!(
                        "Killed `{} {}` after {:?}",
                        program.display(),
                        args.join(" "),
                        timeout
                    );
                    // A grandchild may still hold the pipe; the drain thread is left detached.
                    return ProbeOutput::TimedOut;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ProbeOutput::LaunchFailed(format!("wait: {}", e));
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ProbeOutput {
        SystemCommandRunner.run(
            Path::new("/bin/sh"),
            &["-c".to_string(), script.to_string()],
            timeout,
        )
    }

    #[test]
    fn should_merge_stdout_and_stderr() {
        let output = sh("echo out; echo err 1>&2", Duration::from_secs(10));
        let text = output.into_text().expect("shell should succeed");
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[test]
    fn should_report_non_zero_exit_as_failure() {
        let output = sh("echo broken; exit 3", Duration::from_secs(10));
        assert_eq!(
            output,
            ProbeOutput::Failed {
                code: Some(3),
                output: "broken\n".to_string()
            }
        );
        assert_eq!(output.into_text(), None);
    }

    #[test]
    fn should_kill_process_after_timeout() {
        let started = Instant::now();
        let output = sh("sleep 30", Duration::from_millis(200));
        assert_eq!(output, ProbeOutput::TimedOut);
        assert!(
            started.elapsed() < Duration::from_secs(10),
            "❌ timeout was not enforced"
        );
    }

    #[test]
    fn should_not_wait_for_background_children_holding_output() {
        let started = Instant::now();
        let output = sh("sleep 30 & echo started", Duration::from_millis(300));
        assert_eq!(output, ProbeOutput::TimedOut);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "❌ output drain outlived the timeout"
        );
    }

    #[test]
    fn should_report_missing_binary_as_launch_failure() {
        let output = SystemCommandRunner.run(
            Path::new("/nonexistent/aapt2"),
            &["version".to_string()],
            Duration::from_secs(1),
        );
        assert!(matches!(output, ProbeOutput::LaunchFailed(_)));
    }
}
