//! Chat-completion analyzer for OpenAI- and Anthropic-style APIs.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{
    build_analysis_prompt, build_single_prompt, parse_analysis, parse_single, Analyzer,
    AnalyzerProvider,
};
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::types::{AnalysisResult, AppRecord};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_ERROR_BODY: usize = 512;

/// [`Analyzer`] that sends one user message per call to a hosted model.
///
/// An API key is mandatory against the public provider endpoints. When a
/// custom `base_url` is configured (a gateway or local server) the key is
/// optional.
#[derive(Debug, Clone)]
pub struct ChatAnalyzer {
    provider: AnalyzerProvider,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl ChatAnalyzer {
    /// Builds an analyzer from configuration.
    pub fn new(config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let base_url = match config.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => {
                if api_key.is_none() {
                    return Err(AnalysisError::MissingApiKey {
                        provider: config.provider.to_string(),
                    });
                }
                match config.provider {
                    AnalyzerProvider::OpenAi => OPENAI_BASE_URL.to_string(),
                    AnalyzerProvider::Anthropic => ANTHROPIC_BASE_URL.to_string(),
                }
            },
        };

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AnalysisError::Request(format!("failed to build client: {e}")))?;

        Ok(Self {
            provider: config.provider,
            api_key,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http_client,
        })
    }

    /// The provider this analyzer speaks to.
    pub fn provider(&self) -> AnalyzerProvider {
        self.provider
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, AnalysisError> {
        let request = match self.provider {
            AnalyzerProvider::OpenAi => {
                let request = self
                    .http_client
                    .post(format!("{}/chat/completions", self.base_url));
                match &self.api_key {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            },
            AnalyzerProvider::Anthropic => {
                let request = self
                    .http_client
                    .post(format!("{}/v1/messages", self.base_url))
                    .header("anthropic-version", ANTHROPIC_VERSION);
                match &self.api_key {
                    Some(key) => request.header("x-api-key", key),
                    None => request,
                }
            },
        };

        tracing::debug!(provider = %self.provider, model = %self.model, "calling analyzer");
        let response = request
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;
        extract_text(self.provider, &envelope)
    }
}

/// Pulls the first text completion out of a provider response envelope.
fn extract_text(provider: AnalyzerProvider, envelope: &Value) -> Result<String, AnalysisError> {
    let text = match provider {
        AnalyzerProvider::OpenAi => envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
        AnalyzerProvider::Anthropic => envelope.pointer("/content/0/text").and_then(Value::as_str),
    };
    text.map(str::to_string).ok_or_else(|| {
        AnalysisError::InvalidResponse(format!("no completion text in {provider} response"))
    })
}

#[async_trait]
impl Analyzer for ChatAnalyzer {
    async fn analyze(&self, records: &[AppRecord]) -> Result<AnalysisResult, AnalysisError> {
        if records.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        let text = self.complete(&build_analysis_prompt(records)).await?;
        Ok(parse_analysis(&text))
    }

    async fn analyze_one(&self, record: &AppRecord) -> Result<Map<String, Value>, AnalysisError> {
        let text = self.complete(&build_single_prompt(record)).await?;
        Ok(parse_single(&text, &record.app_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(provider: AnalyzerProvider, base_url: Option<String>) -> AnalyzerConfig {
        AnalyzerConfig {
            provider,
            api_key: Some("sk-test".to_string()),
            base_url,
            ..AnalyzerConfig::default()
        }
    }

    #[test]
    fn public_endpoint_requires_key() {
        let config = AnalyzerConfig {
            api_key: Some("  ".to_string()),
            ..AnalyzerConfig::default()
        };
        assert!(matches!(
            ChatAnalyzer::new(&config),
            Err(AnalysisError::MissingApiKey { provider }) if provider == "openai"
        ));
    }

    #[test]
    fn custom_base_url_makes_key_optional() {
        let config = AnalyzerConfig {
            base_url: Some("http://localhost:11434/v1/".to_string()),
            ..AnalyzerConfig::default()
        };
        let analyzer = ChatAnalyzer::new(&config).unwrap();
        assert_eq!(analyzer.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn extracts_text_per_provider() {
        let openai = json!({"choices": [{"message": {"content": "hi"}}]});
        let anthropic = json!({"content": [{"type": "text", "text": "hello"}]});
        assert_eq!(extract_text(AnalyzerProvider::OpenAi, &openai).unwrap(), "hi");
        assert_eq!(extract_text(AnalyzerProvider::Anthropic, &anthropic).unwrap(), "hello");
        assert!(matches!(
            extract_text(AnalyzerProvider::Anthropic, &openai),
            Err(AnalysisError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn openai_analysis_round() {
        let mut server = mockito::Server::new_async().await;
        let content = json!({
            "summary": "two apps",
            "architecture_type": "microservices",
            "quality_score": 8.5,
        })
        .to_string();
        let body = json!({"choices": [{"message": {"role": "assistant", "content": content}}]});
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let analyzer =
            ChatAnalyzer::new(&config(AnalyzerProvider::OpenAi, Some(server.url()))).unwrap();
        let analysis = analyzer
            .analyze(&[AppRecord::new("a1", "A"), AppRecord::new("a2", "B")])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(analysis.architecture_type, "microservices");
        assert_eq!(analysis.quality_score, 8.5);
    }

    #[tokio::test]
    async fn anthropic_single_record_round() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"content": [{"type": "text", "text": "solid design"}]}).to_string())
            .create_async()
            .await;

        let analyzer =
            ChatAnalyzer::new(&config(AnalyzerProvider::Anthropic, Some(server.url()))).unwrap();
        let review = analyzer.analyze_one(&AppRecord::new("a1", "A")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(review["analysis"], json!("solid design"));
        assert_eq!(review["app_id"], json!("a1"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let analyzer =
            ChatAnalyzer::new(&config(AnalyzerProvider::OpenAi, Some(server.url()))).unwrap();
        let err = analyzer.analyze(&[AppRecord::new("a1", "A")]).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Status { status: 429, ref body } if body == "rate limited"
        ));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_call() {
        let analyzer = ChatAnalyzer::new(&config(
            AnalyzerProvider::OpenAi,
            Some("http://127.0.0.1:9".to_string()),
        ))
        .unwrap();
        assert!(matches!(analyzer.analyze(&[]).await, Err(AnalysisError::EmptyInput)));
    }
}
