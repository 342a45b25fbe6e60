mod anthropic;
mod openai;
mod settings;

use std::{str::FromStr, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use settings::{LlmOverrides, LlmSettings};

/// Generative code-review collaborator.
#[async_trait]
pub trait ReviewClient: Send + Sync {
    /// Tool name recorded on review findings.
    fn name(&self) -> &str;

    /// Return a natural-language critique of `source`, written in `language`.
    async fn review(&self, source: &str, language: &str) -> Result<String>;
}

/// Stand-in used when no provider is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopReviewClient;

#[async_trait]
impl ReviewClient for NoopReviewClient {
    fn name(&self) -> &str {
        "noop"
    }

    async fn review(&self, _source: &str, language: &str) -> Result<String> {
        bail!("no LLM provider configured; {language} source was not reviewed")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Noop,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "noop" | "none" => Ok(Self::Noop),
            other => bail!("unsupported LLM provider `{other}` (expected openai, anthropic, or noop)"),
        }
    }
}

/// Build the review client selected by `settings.provider`.
pub fn build_client(settings: &LlmSettings) -> Result<Arc<dyn ReviewClient>> {
    let client: Arc<dyn ReviewClient> = match settings.provider.parse::<ProviderKind>()? {
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(settings)?),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(settings)?),
        ProviderKind::Noop => Arc::new(NoopReviewClient),
    };
    Ok(client)
}

pub(crate) const SYSTEM_PROMPT: &str = "You are a senior code reviewer. Review the file you are given for bugs, security problems, and maintainability issues. Respond with concise plain-text findings, referencing line numbers where possible. If the code has no notable issues, say so briefly.";

pub(crate) fn review_prompt(source: &str, language: &str) -> String {
    format!("Review the following {language} source file.\n\n```\n{source}\n```\n")
}
