use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::{
    classifier::Classifier, notebook::extract_code_cells, AnalyzerKind, Finding, Linter,
    NOTEBOOK_TOOL, READER_TOOL,
};
use crate::llm::ReviewClient;
use crate::repository::enumerate::FileDescriptor;

/// Routes each file to its analyzer and folds every per-file failure into findings.
pub struct Dispatcher {
    classifier: Arc<Classifier>,
    linter: Arc<dyn Linter>,
    reviewer: Arc<dyn ReviewClient>,
}

impl Dispatcher {
    pub fn new(
        classifier: Arc<Classifier>,
        linter: Arc<dyn Linter>,
        reviewer: Arc<dyn ReviewClient>,
    ) -> Self {
        Self {
            classifier,
            linter,
            reviewer,
        }
    }

    /// Analyze a single file. Never fails: problems become `tool-error` findings.
    #[instrument(name = "dispatch_file", skip(self, file), fields(file = %file.display_name()))]
    pub async fn dispatch(&self, file: &FileDescriptor) -> Vec<Finding> {
        let kind = self.classifier.classify(&file.extension);
        trace!(kind = kind.as_str(), "classified");
        match kind {
            AnalyzerKind::Skip => Vec::new(),
            AnalyzerKind::LocalLint => match read_source(file).await {
                Ok(source) => self.lint(file, &source).await,
                Err(finding) => vec![finding],
            },
            AnalyzerKind::NotebookExtract => {
                let raw = match read_source(file).await {
                    Ok(raw) => raw,
                    Err(finding) => return vec![finding],
                };
                match extract_code_cells(&raw) {
                    Ok(code) => self.lint(file, &code).await,
                    Err(err) => {
                        warn!(error = %err, "notebook extraction failed");
                        vec![Finding::tool_error(
                            file.display_name(),
                            NOTEBOOK_TOOL,
                            err.to_string(),
                        )]
                    }
                }
            }
            AnalyzerKind::GenerativeReview => match read_source(file).await {
                Ok(source) => self.review(file, &source).await,
                Err(finding) => vec![finding],
            },
        }
    }

    /// Dispatch every file with at most `concurrency` in flight, keeping enumeration order.
    ///
    /// Returns `None` when `cancel` fires first; in-flight work is dropped.
    pub async fn dispatch_all<I>(
        &self,
        files: I,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Option<Vec<Finding>>
    where
        I: IntoIterator<Item = FileDescriptor>,
    {
        let per_file = stream::iter(files)
            .map(|file| async move { self.dispatch(&file).await })
            .buffered(concurrency.max(1))
            .collect::<Vec<_>>();

        let per_file = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("dispatch cancelled");
                return None;
            }
            collected = per_file => collected,
        };
        Some(per_file.into_iter().flatten().collect())
    }

    async fn lint(&self, file: &FileDescriptor, source: &str) -> Vec<Finding> {
        let name = file.display_name();
        let tool = self.linter.name();
        match self.linter.lint(source, &name).await {
            Ok(messages) => messages
                .into_iter()
                .map(|msg| Finding::from_lint(name.clone(), tool, msg))
                .collect(),
            Err(err) => {
                warn!(error = %err, "linter failed");
                vec![Finding::tool_error(name, tool, format!("{err:#}"))]
            }
        }
    }

    async fn review(&self, file: &FileDescriptor, source: &str) -> Vec<Finding> {
        let name = file.display_name();
        let language = self
            .classifier
            .language(&file.extension)
            .unwrap_or(file.extension.as_str());
        let tool = self.reviewer.name();
        match self.reviewer.review(source, language).await {
            Ok(text) => vec![Finding::advisory(name, tool, text.trim())],
            Err(err) => {
                warn!(error = %err, "review request failed");
                vec![Finding::tool_error(name, tool, format!("{err:#}"))]
            }
        }
    }
}

/// Read as text, replacing undecodable bytes instead of failing.
async fn read_source(file: &FileDescriptor) -> Result<String, Finding> {
    match tokio::fs::read(&file.path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            warn!(error = %err, "file unreadable");
            Err(Finding::tool_error(
                file.display_name(),
                READER_TOOL,
                format!("failed to read file: {err}"),
            ))
        }
    }
}
