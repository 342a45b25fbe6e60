use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{AcquisitionError, RepositoryCloner};
use crate::config::FetchConfig;

/// Clones through the `git` executable found on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCloner {
    program: String,
    shallow: bool,
    timeout: Option<Duration>,
}

impl Default for GitCloner {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            shallow: true,
            timeout: None,
        }
    }
}

impl GitCloner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        let cloner = Self::new()
            .with_program(&config.program)
            .with_timeout(config.timeout());
        if config.shallow {
            cloner
        } else {
            cloner.full_history()
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Fetch full history instead of only the latest commit.
    pub fn full_history(mut self) -> Self {
        self.shallow = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, remote: &str, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("clone").arg("--quiet");
        if self.shallow {
            cmd.args(["--depth", "1"]);
        }
        cmd.arg("--")
            .arg(remote)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RepositoryCloner for GitCloner {
    async fn fetch_into(&self, remote: &str, dest: &Path) -> Result<(), AcquisitionError> {
        let failure = |detail: String| AcquisitionError::Clone {
            remote: remote.to_string(),
            detail,
        };

        debug!(%remote, dest = %dest.display(), "running git clone");
        let child = self
            .command(remote, dest)
            .spawn()
            .map_err(|err| failure(format!("could not run `{}`: {err}", self.program)))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| failure(format!("timed out after {}s", limit.as_secs())))?,
            None => child.wait_with_output().await,
        }
        .map_err(|err| failure(format!("git did not complete: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!(
                "git exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        info!(%remote, "repository cloned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_an_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = GitCloner::new().with_program("repolens-no-such-git-binary");
        let err = cloner
            .fetch_into("https://github.com/acme/widgets", &dir.path().join("widgets"))
            .await
            .expect_err("spawn failure should be reported");
        match err {
            AcquisitionError::Clone { remote, detail } => {
                assert_eq!(remote, "https://github.com/acme/widgets");
                assert!(detail.contains("could not run"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn shallow_clone_by_default() {
        let cmd = GitCloner::new().command("https://example.com/r.git", Path::new("/tmp/r"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["clone", "--quiet", "--depth", "1", "--", "https://example.com/r.git", "/tmp/r"]
        );

        let cmd = GitCloner::new()
            .full_history()
            .command("https://example.com/r.git", Path::new("/tmp/r"));
        assert!(!cmd
            .as_std()
            .get_args()
            .any(|arg| arg.to_str() == Some("--depth")));
    }

    #[test]
    fn built_from_fetch_config() {
        let config = FetchConfig {
            program: "/opt/git/bin/git".into(),
            shallow: false,
            timeout_secs: Some(45),
        };
        let cloner = GitCloner::from_config(&config);
        assert_eq!(cloner.program, "/opt/git/bin/git");
        assert!(!cloner.shallow);
        assert_eq!(cloner.timeout, Some(Duration::from_secs(45)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_clone_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake_git = dir.path().join("slow-git");
        std::fs::write(&fake_git, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&fake_git, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cloner = GitCloner::new()
            .with_program(fake_git.to_string_lossy())
            .with_timeout(Some(Duration::from_millis(200)));
        let started = std::time::Instant::now();
        let err = cloner
            .fetch_into("https://github.com/acme/widgets", &dir.path().join("widgets"))
            .await
            .expect_err("clone should be cut off");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
