//! Architecture analysis over cleaned records.
//!
//! The pipeline only depends on the [`Analyzer`] trait. Concrete providers
//! are chosen once from [`AnalyzerConfig`] through [`from_config`]; with the
//! `http-client` feature this yields a [`chat::ChatAnalyzer`] that talks to
//! an OpenAI- or Anthropic-style chat endpoint.
//!
//! Model output is parsed leniently: a response that is not an analysis
//! JSON object degrades to a fallback analysis instead of an error.

#[cfg(feature = "http-client")]
pub mod chat;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::types::{AnalysisResult, AppRecord};

/// Supported analysis backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerProvider {
    /// OpenAI-compatible `chat/completions` endpoint.
    #[default]
    OpenAi,
    /// Anthropic `messages` endpoint.
    Anthropic,
}

impl AnalyzerProvider {
    /// Lowercase configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for AnalyzerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerProvider {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(AnalysisError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Produces an architecture analysis from cleaned records.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyzes the whole batch.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::EmptyInput`] for an empty slice; transport and
    /// provider failures otherwise. Unparseable model output is not an
    /// error.
    async fn analyze(&self, records: &[AppRecord]) -> Result<AnalysisResult, AnalysisError>;

    /// Analyzes a single record.
    ///
    /// Returns the model's JSON object, or `{"analysis": <text>}` when the
    /// output is not JSON, with `app_id` always set to the record's id.
    async fn analyze_one(&self, record: &AppRecord) -> Result<Map<String, Value>, AnalysisError>;
}

/// Builds the analyzer selected by `config.provider`.
///
/// # Errors
///
/// [`AnalysisError::MissingApiKey`] when the provider needs a key and none is
/// configured, or [`AnalysisError::UnsupportedProvider`] when the crate was
/// built without an HTTP client.
pub fn from_config(config: &AnalyzerConfig) -> Result<Arc<dyn Analyzer>, AnalysisError> {
    #[cfg(feature = "http-client")]
    {
        let analyzer = chat::ChatAnalyzer::new(config)?;
        Ok(Arc::new(analyzer))
    }
    #[cfg(not(feature = "http-client"))]
    {
        Err(AnalysisError::UnsupportedProvider(format!(
            "{} (built without the http-client feature)",
            config.provider
        )))
    }
}

const ANALYSIS_DIMENSIONS: &str = "\
1. summary: overall description of the architecture (at most 200 words)
2. architecture_type: e.g. microservices, monolith, distributed
3. tech_stack: languages, frameworks and middleware in use
4. languages: list of programming languages
5. frameworks: list of frameworks
6. dependencies: how the applications call each other
7. dependency_graph: adjacency map such as {\"app1\": [\"app2\", \"app3\"]}
8. quality_score: architecture quality from 0 to 10
9. strengths: 3-5 items
10. weaknesses: 3-5 items
11. recommendations: 3-5 items
12. risks: list of objects with risk_type, severity (high/medium/low) and description
13. security_concerns: list
14. scalability: horizontal and vertical scaling assessment
15. performance_bottlenecks: list
16. deployment_recommendations: list
17. monitoring_suggestions: list";

/// Prompt asking for a whole-system analysis of `records`.
pub fn build_analysis_prompt(records: &[AppRecord]) -> String {
    let records_json =
        serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are a senior systems architect. Analyze the architecture of the \
         system described by the following applications.\n\n\
         Applications:\n{records_json}\n\n\
         Answer with a single JSON object containing these fields:\n\
         {ANALYSIS_DIMENSIONS}\n\n\
         Return only valid JSON with no surrounding text."
    )
}

/// Prompt asking for a single-application review.
pub fn build_single_prompt(record: &AppRecord) -> String {
    let record_json = serde_json::to_string_pretty(record).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are a senior application architect. Review the following \
         application.\n\nApplication:\n{record_json}\n\n\
         Cover the technology stack, design soundness, risks, optimization \
         opportunities and deployment advice. Prefer a JSON object answer."
    )
}

/// Parses model output into an [`AnalysisResult`].
///
/// Missing headline fields get placeholder values; output that is not a
/// JSON object, or whose fields have the wrong shape, yields
/// [`fallback_analysis`].
///
/// # Examples
///
/// ```
/// use archi_pipeline::analyzer::parse_analysis;
///
/// let analysis = parse_analysis(r#"{"architecture_type": "monolith", "quality_score": 6}"#);
/// assert_eq!(analysis.architecture_type, "monolith");
/// assert_eq!(analysis.quality_score, 6.0);
///
/// let degraded = parse_analysis("sorry, I cannot help");
/// assert_eq!(degraded.quality_score, 0.0);
/// assert_eq!(degraded.weaknesses.len(), 1);
/// ```
pub fn parse_analysis(text: &str) -> AnalysisResult {
    let mut object = match serde_json::from_str::<Value>(strip_code_fence(text)) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return fallback_analysis("model response is not a JSON object"),
        Err(e) => return fallback_analysis(&format!("failed to parse model response: {e}")),
    };

    for (field, default) in [
        (
            "summary",
            json!("analysis finished but the model returned an incomplete result"),
        ),
        ("architecture_type", json!("unknown")),
        ("quality_score", json!(5.0)),
        ("strengths", json!(["needs further confirmation"])),
        ("weaknesses", json!(["needs further confirmation"])),
        ("recommendations", json!(["review the result manually"])),
    ] {
        object.entry(field).or_insert(default);
    }

    match serde_json::from_value::<AnalysisResult>(Value::Object(object)) {
        Ok(analysis) => {
            let score = analysis.quality_score;
            analysis.with_quality_score(score)
        },
        Err(e) => fallback_analysis(&format!("unexpected analysis shape: {e}")),
    }
}

/// Parses single-record output, injecting `app_id`.
pub fn parse_single(text: &str, app_id: &str) -> Map<String, Value> {
    let mut object = match serde_json::from_str::<Value>(strip_code_fence(text)) {
        Ok(Value::Object(object)) => object,
        _ => {
            let mut object = Map::new();
            object.insert("analysis".to_string(), Value::String(text.to_string()));
            object
        },
    };
    object.insert("app_id".to_string(), Value::String(app_id.to_string()));
    object
}

/// Analysis returned when model output cannot be used.
pub fn fallback_analysis(reason: &str) -> AnalysisResult {
    let mut analysis =
        AnalysisResult::new(format!("architecture analysis failed: {reason}"), "unknown");
    analysis.weaknesses = vec![reason.to_string()];
    analysis.recommendations =
        vec!["check the analyzer configuration and network connectivity".to_string()];
    analysis
}

// Models often wrap JSON in a ```json fence despite being told not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
