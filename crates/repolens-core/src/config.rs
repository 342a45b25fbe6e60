use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::analysis::classifier::{Classifier, RouteOverride};
use crate::llm::LlmOverrides;

/// Tunables for one pipeline instance. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory that receives checkouts, one subdirectory per repository name.
    pub workdir: PathBuf,
    /// Maximum number of files analyzed at once.
    pub concurrency: usize,
    /// Leave the checkout on disk after the run.
    pub keep_checkout: bool,
    pub fetch: FetchConfig,
    pub lint: LintConfig,
    /// Extension routes added to (or replacing) the built-in table.
    pub routes: Vec<RouteOverride>,
    pub tracker: TrackerConfig,
    pub llm: LlmOverrides,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("./checkouts"),
            concurrency: 4,
            keep_checkout: false,
            fetch: FetchConfig::default(),
            lint: LintConfig::default(),
            routes: Vec::new(),
            tracker: TrackerConfig::default(),
            llm: LlmOverrides::default(),
        }
    }
}

/// How checkouts are fetched with `git`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub program: String,
    /// Fetch only the latest commit.
    pub shallow: bool,
    pub timeout_secs: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            shallow: true,
            timeout_secs: Some(300),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            program: "pylint".to_string(),
            args: Vec::new(),
            timeout_secs: Some(120),
        }
    }
}

impl LintConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("lint program must not be empty")]
    EmptyLintProgram,
    #[error("fetch program must not be empty")]
    EmptyFetchProgram,
    #[error("tracker base_url `{0}` is not a valid URL")]
    InvalidTrackerUrl(String),
    #[error("route extension `{0}` is empty")]
    EmptyRouteExtension(String),
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.lint.program.trim().is_empty() {
            return Err(ConfigError::EmptyLintProgram);
        }
        if self.fetch.program.trim().is_empty() {
            return Err(ConfigError::EmptyFetchProgram);
        }
        if Url::parse(&self.tracker.base_url).is_err() {
            return Err(ConfigError::InvalidTrackerUrl(self.tracker.base_url.clone()));
        }
        if let Some(route) = self
            .routes
            .iter()
            .find(|route| route.extension.trim().trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::EmptyRouteExtension(route.extension.clone()));
        }
        Ok(())
    }

    /// Built-in routing table with the configured overrides applied.
    pub fn classifier(&self) -> Classifier {
        Classifier::builtin().with_overrides(&self.routes)
    }
}
