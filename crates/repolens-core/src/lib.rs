pub mod analysis;
pub mod config;
pub mod llm;
pub mod metadata;
pub mod pipeline;
pub mod report;
pub mod repository;

pub use analysis::{
    classifier::{Classifier, Route, RouteOverride},
    dispatch::Dispatcher,
    pylint::PylintLinter,
    AnalyzerKind, Finding, LintMessage, Linter, Severity,
};
pub use config::{ConfigError, FetchConfig, PipelineConfig};
pub use llm::{LlmSettings, ReviewClient};
pub use metadata::{github::GithubTracker, IssueTracker, MetadataCollector, RepositorySummary};
pub use pipeline::{AnalyzeError, Collaborators, Pipeline};
pub use report::{assemble, render_report, AnalysisReport, OutputFormat};
pub use repository::{
    enumerate::{enumerate_files, FileDescriptor},
    git_cloner::GitCloner,
    AcquisitionError, Acquirer, LocalRepository, RepositoryCloner, RepositoryRef,
};
