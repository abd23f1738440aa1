use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error};
use nodelayer_core::RuntimeVersion;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to start layer job: {0}")]
    Spawn(#[from] io::Error),

    /// The child's stdout followed by its stderr.
    #[error("{output}")]
    Failed { output: String },

    #[error("Layer job did not finish within {} seconds", .0.as_secs())]
    Timeout(Duration),
}

/// Runs each layer job in a fresh copy of the current executable, so a
/// crashing job never takes the listener down with it.
#[derive(Debug, Clone)]
pub struct SelfExec {
    exe: PathBuf,
    timeout: Duration,
}

impl SelfExec {
    #[must_use]
    pub fn new(exe: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            exe: exe.into(),
            timeout,
        }
    }

    /// Target the running binary.
    ///
    /// # Errors
    /// Returns an error if neither the OS nor `argv[0]` can name the binary.
    pub fn current(timeout: Duration) -> io::Result<Self> {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(error) => {
                debug!("current_exe unavailable ({error}), falling back to argv[0]");
                let argv0 = std::env::args_os()
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "argv[0] is empty"))?;
                if argv0.is_absolute() {
                    argv0
                } else {
                    std::env::current_dir()?.join(argv0)
                }
            }
        };
        Ok(Self::new(exe, timeout))
    }

    /// Build one layer in a child process and return the archive path it
    /// reports on stdout.
    ///
    /// Dropping the returned future kills the child.
    ///
    /// # Errors
    /// Returns an error if the child cannot start, exits unsuccessfully,
    /// reports no path, or outlives the job timeout.
    pub async fn run(
        &self,
        version: &RuntimeVersion,
        packages: &str,
    ) -> Result<PathBuf, DispatchError> {
        let mut cmd = Command::new(&self.exe);
        cmd.arg(format!("--version={version}"))
            .arg(format!("--packages={packages}"))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(
            "Spawning {} --version={version} --packages={packages:?}",
            self.exe.display()
        );

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                error!("Layer job for {version} timed out, killing it");
                DispatchError::Timeout(self.timeout)
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{stdout}{stderr}");
            let output = if combined.trim().is_empty() {
                format!("Layer job exited with {}", output.status)
            } else {
                combined
            };
            return Err(DispatchError::Failed { output });
        }

        let path = stdout.trim();
        if path.is_empty() {
            return Err(DispatchError::Failed {
                output: "Layer job reported no archive path".to_string(),
            });
        }
        Ok(PathBuf::from(path))
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use nodelayer_core::RuntimeVersion;

    use super::{DispatchError, SelfExec};

    /// Write an executable shell script standing in for the binary.
    pub(crate) fn fake_exe(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let exe = dir.join("nodelayer");
        std::fs::write(&exe, script).expect("fake binary should be written");
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755))
            .expect("fake binary should be made executable");
        exe
    }

    fn v22() -> RuntimeVersion {
        RuntimeVersion::parse("v22.12.0").unwrap()
    }

    #[tokio::test]
    async fn success_returns_trimmed_stdout_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_exe(dir.path(), "#!/bin/sh\necho \"  /tmp/nodelayer-x/layer.zip  \"\n");

        let path = SelfExec::new(exe, Duration::from_secs(10))
            .run(&v22(), "is-odd")
            .await
            .unwrap();

        assert_eq!(path, PathBuf::from("/tmp/nodelayer-x/layer.zip"));
    }

    #[tokio::test]
    async fn child_receives_version_and_packages() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "#!/bin/sh\necho \"$*\" > {}/args\necho /x/layer.zip\n",
            dir.path().display()
        );
        let exe = fake_exe(dir.path(), &script);

        SelfExec::new(exe, Duration::from_secs(10))
            .run(&v22(), "is-odd,is-even")
            .await
            .unwrap();

        let args = std::fs::read_to_string(dir.path().join("args")).unwrap();
        assert_eq!(args.trim(), "--version=v22.12.0 --packages=is-odd,is-even");
    }

    #[tokio::test]
    async fn flag_like_packages_stay_attached_to_their_option() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > {}/args\necho /x/layer.zip\n",
            dir.path().display()
        );
        let exe = fake_exe(dir.path(), &script);

        SelfExec::new(exe, Duration::from_secs(10))
            .run(&v22(), "--help")
            .await
            .unwrap();

        let args = std::fs::read_to_string(dir.path().join("args")).unwrap();
        assert_eq!(args, "--version=v22.12.0\n--packages=--help\n");
    }

    #[tokio::test]
    async fn failure_carries_child_output() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_exe(dir.path(), "#!/bin/sh\necho 'npm ERR! 404 Not Found' >&2\nexit 1\n");

        let result = SelfExec::new(exe, Duration::from_secs(10))
            .run(&v22(), "missing-package")
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::Failed { ref output }) if output.contains("404 Not Found")
        ));
    }

    #[tokio::test]
    async fn silent_failure_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_exe(dir.path(), "#!/bin/sh\nexit 3\n");

        let result = SelfExec::new(exe, Duration::from_secs(10))
            .run(&v22(), "")
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::Failed { ref output }) if output.starts_with("Layer job exited with")
        ));
    }

    #[tokio::test]
    async fn empty_stdout_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_exe(dir.path(), "#!/bin/sh\nexit 0\n");

        let result = SelfExec::new(exe, Duration::from_secs(10))
            .run(&v22(), "")
            .await;

        assert!(matches!(result, Err(DispatchError::Failed { .. })));
    }

    #[tokio::test]
    async fn slow_child_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_exe(dir.path(), "#!/bin/sh\nsleep 5\necho /x/layer.zip\n");

        let result = SelfExec::new(exe, Duration::from_millis(200))
            .run(&v22(), "")
            .await;

        assert!(matches!(result, Err(DispatchError::Timeout(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = SelfExec::new(dir.path().join("absent"), Duration::from_secs(1))
            .run(&v22(), "")
            .await;

        assert!(matches!(result, Err(DispatchError::Spawn(_))));
    }

    #[test]
    fn current_points_at_an_existing_binary() {
        let exec = SelfExec::current(Duration::from_secs(1)).unwrap();
        assert!(exec.exe.exists());
    }
}
