use std::{process::Stdio, time::Duration};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, trace};

use super::{LintMessage, Linter};

/// Pylint reports command-line usage errors through this exit status bit.
const USAGE_ERROR_BIT: i32 = 32;

/// Runs pylint on source text fed through stdin, so no scratch file is shared between runs.
#[derive(Debug, Clone)]
pub struct PylintLinter {
    program: String,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl Default for PylintLinter {
    fn default() -> Self {
        Self {
            program: "pylint".to_string(),
            extra_args: Vec::new(),
            timeout: None,
        }
    }
}

impl PylintLinter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, display_name: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args)
            .arg("--output-format=json")
            .arg("--from-stdin")
            .arg(display_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, source: &str, display_name: &str) -> Result<std::process::Output> {
        let mut child = self
            .command(display_name)
            .spawn()
            .with_context(|| format!("failed to start `{}`", self.program))?;
        let mut stdin = child
            .stdin
            .take()
            .context("linter stdin was not captured")?;

        let feed = async move {
            let written = stdin.write_all(source.as_bytes()).await;
            drop(stdin);
            written
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        if let Err(err) = written {
            // The tool may exit before draining stdin; its own status decides the outcome.
            debug!(error = %err, "linter closed stdin early");
        }
        output.with_context(|| format!("`{}` did not complete", self.program))
    }
}

#[async_trait]
impl Linter for PylintLinter {
    fn name(&self) -> &str {
        "pylint"
    }

    async fn lint(&self, source: &str, display_name: &str) -> Result<Vec<LintMessage>> {
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(source, display_name))
                .await
                .with_context(|| format!("pylint timed out after {}s", limit.as_secs()))??,
            None => self.run(source, display_name).await?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = match output.status.code() {
            None => bail!("pylint was terminated by a signal: {}", stderr.trim()),
            Some(code) if code & USAGE_ERROR_BIT != 0 => {
                bail!("pylint usage error (exit {code}): {}", stderr.trim())
            }
            Some(code) => code,
        };
        trace!(code, "pylint finished");

        // The JSON reporter prints `[]` for a clean file, so a failing run with
        // nothing on stdout means the tool itself broke.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() && code != 0 {
            bail!("pylint exited with status {code} and no report: {}", stderr.trim());
        }
        parse_pylint_json(&stdout).with_context(|| {
            format!("unexpected pylint output (stderr: {})", stderr.trim())
        })
    }
}

#[derive(Deserialize)]
struct PylintRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    message: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default, rename = "message-id")]
    message_id: Option<String>,
}

/// Parse pylint's `--output-format=json` array. Empty output means no messages.
pub fn parse_pylint_json(stdout: &str) -> Result<Vec<LintMessage>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<PylintRecord> =
        serde_json::from_str(trimmed).context("pylint output is not a JSON message array")?;
    Ok(records
        .into_iter()
        .map(|record| LintMessage {
            message: record.message,
            line: record.line,
            kind: record.kind,
            module: record.module.filter(|m| !m.is_empty()),
            symbol: record.symbol.or(record.message_id),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pylint_records() {
        let stdout = r#"[
            {
                "type": "convention",
                "module": "example",
                "obj": "",
                "line": 1,
                "column": 0,
                "path": "example.py",
                "symbol": "missing-module-docstring",
                "message": "Missing module docstring",
                "message-id": "C0114"
            },
            {
                "type": "error",
                "module": "example",
                "line": 4,
                "message": "Undefined variable 'foo'",
                "message-id": "E0602"
            }
        ]"#;
        let messages = parse_pylint_json(stdout).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, "convention");
        assert_eq!(messages[0].symbol.as_deref(), Some("missing-module-docstring"));
        assert_eq!(messages[1].line, Some(4));
        assert_eq!(messages[1].symbol.as_deref(), Some("E0602"));
    }

    #[test]
    fn empty_output_means_clean_file() {
        assert!(parse_pylint_json("").unwrap().is_empty());
        assert!(parse_pylint_json("[]\n").unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_pylint_json("Traceback (most recent call last):").is_err());
    }

    #[test]
    fn command_reads_source_from_stdin() {
        let linter = PylintLinter::new("pylint").with_args(["--disable=C"]);
        let cmd = linter.command("pkg/mod.py");
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["--disable=C", "--output-format=json", "--from-stdin", "pkg/mod.py"]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_tool_failure() {
        let linter = PylintLinter::new("repolens-no-such-linter");
        let err = linter.lint("x = 1\n", "x.py").await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }

    #[cfg(unix)]
    fn shell_linter(script: &str) -> PylintLinter {
        PylintLinter::new("sh").with_args(["-c", script, "sh"])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn crash_without_report_is_a_tool_failure() {
        let linter = shell_linter("cat >/dev/null; echo 'No module named pylint' >&2; exit 1");
        let err = linter.lint("x = 1\n", "x.py").await.unwrap_err();
        assert!(err.to_string().contains("status 1"), "{err}");
        assert!(err.to_string().contains("No module named pylint"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn messages_with_nonzero_status_are_parsed() {
        let linter = shell_linter(
            r#"cat >/dev/null; echo '[{"type": "warning", "line": 2, "message": "Unused variable", "symbol": "unused-variable"}]'; exit 4"#,
        );
        let messages = linter.lint("def f():\n    y = 1\n", "f.py").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].line, Some(2));
        assert_eq!(messages[0].symbol.as_deref(), Some("unused-variable"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_run_reports_nothing() {
        let linter = shell_linter("cat >/dev/null; echo '[]'");
        assert!(linter.lint("x = 1\n", "x.py").await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn usage_errors_are_tool_failures() {
        let linter = shell_linter("cat >/dev/null; echo 'no such option' >&2; exit 32");
        let err = linter.lint("x = 1\n", "x.py").await.unwrap_err();
        assert!(err.to_string().contains("usage error"), "{err}");
    }
}
