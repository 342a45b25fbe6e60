use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ProviderKind;

/// Environment-driven configuration for the generative review backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: String,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Values from a configuration file, used for any variable missing from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmOverrides {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl LlmSettings {
    const PROVIDER_ENV: &'static str = "REPOLENS_PROVIDER";
    const API_KEY_ENV: &'static str = "REPOLENS_API_KEY";
    const ENDPOINT_ENV: &'static str = "REPOLENS_ENDPOINT";
    const MODEL_ENV: &'static str = "REPOLENS_MODEL";
    const TIMEOUT_ENV: &'static str = "REPOLENS_TIMEOUT_SECS";

    /// Settings for the offline `noop` reviewer.
    pub fn noop() -> Self {
        Self {
            provider: "noop".into(),
            api_key: String::new(),
            endpoint: None,
            model: None,
            timeout_secs: None,
        }
    }

    /// Load settings from environment variables.
    ///
    /// * `REPOLENS_PROVIDER` — `openai`, `anthropic` or `noop`. Defaults to `openai`
    ///   when an API key is present and `noop` otherwise.
    /// * `REPOLENS_API_KEY` — API key/token (required for remote providers).
    /// * `REPOLENS_ENDPOINT` — Optional custom base URL.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&LlmOverrides::default())
    }

    /// Like [`LlmSettings::from_env`], filling unset variables from `overrides`.
    pub fn from_env_with(overrides: &LlmOverrides) -> Result<Self> {
        let mut vars: HashMap<String, String> = std::env::vars().collect();
        overrides.fill(&mut vars);
        Self::from_map(vars)
    }

    fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let non_blank = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let api_key = non_blank(Self::API_KEY_ENV);
        let default_provider = if api_key.is_some() { "openai" } else { "noop" };
        let provider =
            non_blank(Self::PROVIDER_ENV).unwrap_or_else(|| default_provider.to_string());
        let kind: ProviderKind = provider.parse()?;
        if kind != ProviderKind::Noop && api_key.is_none() {
            bail!(
                "environment variable {} must be set for provider `{}`",
                Self::API_KEY_ENV,
                provider
            );
        }
        let timeout_secs = vars
            .get(Self::TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(Self {
            provider,
            api_key: api_key.unwrap_or_default(),
            endpoint: non_blank(Self::ENDPOINT_ENV),
            model: non_blank(Self::MODEL_ENV),
            timeout_secs,
        })
    }
}

impl LlmOverrides {
    fn fill(&self, vars: &mut HashMap<String, String>) {
        let entries = [
            (LlmSettings::PROVIDER_ENV, self.provider.clone()),
            (LlmSettings::API_KEY_ENV, self.api_key.clone()),
            (LlmSettings::ENDPOINT_ENV, self.endpoint.clone()),
            (LlmSettings::MODEL_ENV, self.model.clone()),
            (
                LlmSettings::TIMEOUT_ENV,
                self.timeout_secs.map(|secs| secs.to_string()),
            ),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                vars.entry(key.to_string()).or_insert(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_noop_without_key() {
        let settings = LlmSettings::from_map(HashMap::new()).expect("noop needs nothing");
        assert_eq!(settings.provider, "noop");
        assert!(settings.api_key.is_empty());
        assert!(settings.endpoint.is_none());
    }

    #[test]
    fn defaults_to_openai_with_key() {
        let settings = LlmSettings::from_map(vars(&[(LlmSettings::API_KEY_ENV, "secret")]))
            .expect("should load settings");
        assert_eq!(settings.provider, "openai");
        assert_eq!(settings.api_key, "secret");
        assert!(settings.model.is_none());
    }

    #[test]
    fn errors_when_api_key_missing() {
        let err = LlmSettings::from_map(vars(&[(LlmSettings::PROVIDER_ENV, "anthropic")]))
            .expect_err("missing API key should error");
        assert!(err.to_string().contains(LlmSettings::API_KEY_ENV));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = LlmSettings::from_map(vars(&[
            (LlmSettings::PROVIDER_ENV, "mystery"),
            (LlmSettings::API_KEY_ENV, "secret"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn parses_timeout_and_endpoint() {
        let settings = LlmSettings::from_map(vars(&[
            (LlmSettings::PROVIDER_ENV, "openai"),
            (LlmSettings::API_KEY_ENV, "secret"),
            (LlmSettings::TIMEOUT_ENV, "45"),
            (LlmSettings::ENDPOINT_ENV, " http://localhost:8080 "),
        ]))
        .expect("should parse timeout/endpoint");
        assert_eq!(settings.timeout_secs, Some(45));
        assert_eq!(settings.endpoint.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn overrides_only_fill_missing_variables() {
        let mut map = vars(&[(LlmSettings::MODEL_ENV, "env-model")]);
        LlmOverrides {
            provider: Some("noop".into()),
            model: Some("file-model".into()),
            ..Default::default()
        }
        .fill(&mut map);
        let settings = LlmSettings::from_map(map).unwrap();
        assert_eq!(settings.provider, "noop");
        assert_eq!(settings.model.as_deref(), Some("env-model"));
    }

    #[test]
    fn from_env_with_reads_process_environment() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var(LlmSettings::PROVIDER_ENV, "noop");
        env::remove_var(LlmSettings::MODEL_ENV);
        let settings = LlmSettings::from_env_with(&LlmOverrides {
            model: Some("file-model".into()),
            ..Default::default()
        })
        .expect("noop should not require key");
        env::remove_var(LlmSettings::PROVIDER_ENV);
        assert_eq!(settings.provider, "noop");
        assert_eq!(settings.model.as_deref(), Some("file-model"));
    }
}
