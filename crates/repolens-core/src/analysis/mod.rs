use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod classifier;
pub mod dispatch;
pub mod notebook;
pub mod pylint;

/// Tool label attached to findings about files that could not be read.
pub const READER_TOOL: &str = "reader";
/// Tool label attached to findings about notebooks that could not be parsed.
pub const NOTEBOOK_TOOL: &str = "notebook";

/// How a file is handled, decided from its extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    LocalLint,
    NotebookExtract,
    GenerativeReview,
    Skip,
}

impl AnalyzerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalLint => "local_lint",
            Self::NotebookExtract => "notebook_extract",
            Self::GenerativeReview => "generative_review",
            Self::Skip => "skip",
        }
    }
}

/// Severity buckets shared by every analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Refactor,
    Convention,
    Info,
    Advisory,
    ToolError,
}

impl Severity {
    /// Map a lint record's `type` field; unknown types are treated as informational.
    pub fn from_lint_type(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "fatal" => Self::Fatal,
            "error" => Self::Error,
            "warning" => Self::Warning,
            "refactor" => Self::Refactor,
            "convention" => Self::Convention,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Refactor => "refactor",
            Self::Convention => "convention",
            Self::Info => "info",
            Self::Advisory => "advisory",
            Self::ToolError => "tool-error",
        }
    }
}

/// One normalized analysis result, independent of the analyzer that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Repository-relative path; absent for findings not tied to a file.
    pub source_file: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub line: Option<u32>,
    /// Linter rule identifier (symbol or message id) when the tool reports one.
    pub rule: Option<String>,
    pub module: Option<String>,
    /// Name of the tool that produced the finding.
    pub tool: String,
}

impl Finding {
    /// Diagnostic finding for a file that could not be read or analyzed.
    pub fn tool_error(
        source_file: impl Into<String>,
        tool: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_file: Some(source_file.into()),
            message: reason.into(),
            severity: Severity::ToolError,
            line: None,
            rule: None,
            module: None,
            tool: tool.into(),
        }
    }

    /// File-scoped free-text review.
    pub fn advisory(
        source_file: impl Into<String>,
        tool: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_file: Some(source_file.into()),
            message: text.into(),
            severity: Severity::Advisory,
            line: None,
            rule: None,
            module: None,
            tool: tool.into(),
        }
    }

    pub fn from_lint(
        source_file: impl Into<String>,
        tool: impl Into<String>,
        msg: LintMessage,
    ) -> Self {
        Self {
            source_file: Some(source_file.into()),
            severity: Severity::from_lint_type(&msg.kind),
            message: msg.message,
            line: msg.line,
            rule: msg.symbol,
            module: msg.module,
            tool: tool.into(),
        }
    }
}

/// Record produced by a lint collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintMessage {
    pub message: String,
    pub line: Option<u32>,
    /// Tool-specific severity label (`error`, `warning`, `convention`, ...).
    pub kind: String,
    pub module: Option<String>,
    pub symbol: Option<String>,
}

/// Static-analysis collaborator invoked on in-memory source text.
#[async_trait]
pub trait Linter: Send + Sync {
    /// Tool name recorded on every finding this linter produces.
    fn name(&self) -> &str;

    /// Lint `source`, reporting it under `display_name`. Errors mean the tool itself failed.
    async fn lint(&self, source: &str, display_name: &str) -> AnyResult<Vec<LintMessage>>;
}
