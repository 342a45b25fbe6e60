use std::{path::PathBuf, sync::Arc};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::analysis::{dispatch::Dispatcher, Linter};
use crate::config::PipelineConfig;
use crate::llm::ReviewClient;
use crate::metadata::{read_readme, IssueTracker, MetadataCollector};
use crate::report::{assemble, AnalysisReport};
use crate::repository::{
    enumerate::enumerate, AcquisitionError, Acquirer, RepositoryCloner, RepositoryRef,
};

/// Failures that abort a whole run. Everything else lands in the report.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("analysis cancelled")]
    Cancelled,
}

/// External collaborators the pipeline calls through narrow traits.
#[derive(Clone)]
pub struct Collaborators {
    pub cloner: Arc<dyn RepositoryCloner>,
    pub linter: Arc<dyn Linter>,
    pub reviewer: Arc<dyn ReviewClient>,
    pub tracker: Arc<dyn IssueTracker>,
}

/// Acquire, enumerate, classify, dispatch and assemble.
pub struct Pipeline {
    acquirer: Acquirer,
    dispatcher: Dispatcher,
    metadata: MetadataCollector,
    workdir: PathBuf,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            cloner,
            linter,
            reviewer,
            tracker,
        } = collaborators;
        Self {
            acquirer: Acquirer::new(cloner).keep_checkouts(config.keep_checkout),
            dispatcher: Dispatcher::new(Arc::new(config.classifier()), linter, reviewer),
            metadata: MetadataCollector::new(tracker),
            workdir: config.workdir.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Analyze one repository.
    ///
    /// Only acquisition failure or cancellation aborts the run; per-file and
    /// metadata problems are folded into the returned report. A cancelled run
    /// discards whatever findings were already collected.
    #[instrument(name = "analyze", skip(self, repo, cancel), fields(repo = %repo))]
    pub async fn analyze(
        &self,
        repo: &RepositoryRef,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let local = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalyzeError::Cancelled),
            acquired = self.acquirer.acquire(repo, &self.workdir) => acquired?,
        };
        info!(root = %local.root().display(), "repository acquired");

        let files = enumerate(&local);
        let metadata = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => (Vec::new(), None),
                collected = async {
                    tokio::join!(self.metadata.open_issues(repo), self.metadata.summary(repo))
                } => collected,
            }
        };
        let (findings, readme_text, (open_issues, summary)) = tokio::join!(
            self.dispatcher.dispatch_all(files, self.concurrency, cancel),
            read_readme(local.root()),
            metadata,
        );

        local.release().await;

        let Some(findings) = findings else {
            debug!("dropping partial results");
            return Err(AnalyzeError::Cancelled);
        };
        info!(
            findings = findings.len(),
            issues = open_issues.len(),
            "analysis complete"
        );
        Ok(assemble(
            repo.remote(),
            findings,
            readme_text,
            open_issues,
            summary,
        ))
    }
}
