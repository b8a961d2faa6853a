//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod openai_compatible;
#[cfg(test)]
pub mod scripted;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `OPENAI_API_KEY` / `LLM_API_KEY` env (never TOML)
/// and is `None` for keyless local models.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.temperature,
                oai.max_tokens,
                oai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn builds_dummy() {
        let cfg = Config::test_default();
        assert!(matches!(build(&cfg.llm, None), Ok(LlmProvider::Dummy(_))));
    }

    #[test]
    fn builds_openai_without_key() {
        let mut cfg = Config::test_default();
        cfg.llm.provider = "openai".into();
        assert!(matches!(build(&cfg.llm, None), Ok(LlmProvider::OpenAiCompatible(_))));
    }

    #[test]
    fn unknown_provider_errors() {
        let mut cfg = Config::test_default();
        cfg.llm.provider = "mystery".into();
        let err = build(&cfg.llm, None).unwrap_err();
        assert!(err.to_string().contains("mystery"));
    }
}
