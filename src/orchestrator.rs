use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::copy_tree;
use crate::error::Error;
use crate::model::{result_for_status, result_with_error, Mutation, MutationResult, TestStatus};

/// Environment variables the test runner inherits; everything else is
/// stripped.
const RUNNER_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "GOROOT",
    "GOPATH",
    "GOCACHE",
    "GOMODCACHE",
    "GOFLAGS",
    "TMPDIR",
];

/// The external test-runner command. The companion test's workspace-relative
/// path is appended as the final argument.
#[derive(Debug, Clone)]
pub struct TestRunner {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for TestRunner {
    fn default() -> Self {
        TestRunner {
            program: "go".to_string(),
            args: vec!["test".to_string(), "-v".to_string()],
        }
    }
}

/// Applies one mutation in a private workspace and maps the runner's exit
/// status onto a verdict. Stateless: each call owns its workspace for the
/// duration of a single mutation.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    runner: TestRunner,
    timeout: Duration,
}

enum RunOutcome {
    Exited(bool),
    TimedOut,
}

impl Orchestrator {
    pub fn new(runner: TestRunner, timeout: Duration) -> Self {
        Orchestrator { runner, timeout }
    }

    /// Test a single mutation.
    ///
    /// Workspace and write failures yield an `Error` entry rather than a
    /// hard failure, so one bad mutation cannot sink a run of thousands.
    pub fn test_mutation(
        &self,
        mutation: &Mutation,
        token: &CancelToken,
    ) -> Result<MutationResult, Error> {
        if mutation.source.origin.path.as_os_str().is_empty() {
            return Err(Error::input("", "mutation has no source origin"));
        }

        if token.is_cancelled() {
            return Ok(result_for_status(mutation, TestStatus::Timeout));
        }

        let Some(test) = &mutation.source.test else {
            // Nothing can detect the mutant.
            return Ok(result_for_status(mutation, TestStatus::Survived));
        };

        let origin = &mutation.source.origin.path;
        let project_root = copy_tree::find_project_root(origin);

        // The TempDir guard is taken before anything else can fail, so every
        // exit path below releases the workspace.
        let workspace = match tempfile::Builder::new()
            .prefix("gooze-mutation-")
            .tempdir()
        {
            Ok(dir) => dir,
            Err(e) => {
                return Ok(self.error_result(mutation, format!("create workspace: {e}")));
            }
        };

        if let Err(e) = copy_tree::copy_project(&project_root, workspace.path()) {
            return Ok(self.error_result(mutation, format!("copy project: {e}")));
        }

        let rel_origin = match origin.strip_prefix(&project_root) {
            Ok(rel) => rel,
            Err(_) => {
                return Ok(self.error_result(
                    mutation,
                    format!("origin {} outside project root", origin.display()),
                ));
            }
        };

        let mutated_path = workspace.path().join(rel_origin);
        if let Err(e) = write_restricted(&mutated_path, &mutation.mutated_code) {
            return Ok(self.error_result(mutation, format!("write mutated file: {e}")));
        }

        let rel_test = match test.path.strip_prefix(&project_root) {
            Ok(rel) => rel,
            Err(_) => {
                return Ok(self.error_result(
                    mutation,
                    format!("test {} outside project root", test.path.display()),
                ));
            }
        };

        let status = match self.run_tests(workspace.path(), rel_test, token) {
            RunOutcome::Exited(true) => TestStatus::Survived,
            RunOutcome::Exited(false) => TestStatus::Killed,
            RunOutcome::TimedOut => TestStatus::Timeout,
        };

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "failed to clean up workspace");
        }

        Ok(result_for_status(mutation, status))
    }

    fn error_result(&self, mutation: &Mutation, message: String) -> MutationResult {
        tracing::error!(
            id = %mutation.id,
            path = %mutation.source.origin.path.display(),
            %message,
            "mutation workspace error"
        );
        result_with_error(mutation, TestStatus::Error, Some(message))
    }

    fn run_tests(&self, workspace: &Path, rel_test: &Path, token: &CancelToken) -> RunOutcome {
        if token.is_cancelled() {
            return RunOutcome::TimedOut;
        }

        let mut cmd = Command::new(&self.runner.program);
        cmd.args(&self.runner.args)
            .arg(rel_test)
            .current_dir(workspace)
            .env_clear()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for key in RUNNER_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(program = %self.runner.program, error = %e, "failed to spawn test runner");
                return RunOutcome::TimedOut;
            }
        };

        // Drain the pipes on their own threads so a chatty runner cannot
        // fill the buffers and deadlock the wait loop.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let start = Instant::now();
        let outcome = loop {
            match child.try_wait() {
                Ok(Some(exit_status)) => break RunOutcome::Exited(exit_status.success()),
                Ok(None) => {
                    if token.is_cancelled() || start.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        break RunOutcome::TimedOut;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break RunOutcome::TimedOut;
                }
            }
        };

        let mut combined = String::new();
        for handle in [stdout, stderr].into_iter().flatten() {
            if let Ok(output) = handle.join() {
                combined.push_str(&output);
            }
        }
        tracing::debug!(output_len = combined.len(), "test runner finished");

        outcome
    }
}

fn spawn_reader(mut pipe: impl Read + Send + 'static) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

/// Write the mutated body with permissions restricted to the owner.
fn write_restricted(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
