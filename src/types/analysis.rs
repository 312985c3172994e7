//! Architecture analysis produced by an analyzer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured architecture assessment of a batch of records.
///
/// Every field except `summary` and `architecture_type` defaults when
/// missing, so partially filled provider answers still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    /// e.g. `microservices`, `monolith`.
    pub architecture_type: String,

    #[serde(default)]
    pub tech_stack: Map<String, Value>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,

    #[serde(default)]
    pub dependencies: Map<String, Value>,
    /// Adjacency list: app id to the app ids it calls.
    #[serde(default)]
    pub dependency_graph: BTreeMap<String, Vec<String>>,

    /// Quality score in `[0, 10]`.
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,

    #[serde(default)]
    pub risks: Vec<Value>,
    #[serde(default)]
    pub security_concerns: Vec<String>,

    #[serde(default)]
    pub scalability: Map<String, Value>,
    #[serde(default)]
    pub performance_bottlenecks: Vec<String>,

    #[serde(default)]
    pub deployment_recommendations: Vec<String>,
    #[serde(default)]
    pub monitoring_suggestions: Vec<String>,
}

impl AnalysisResult {
    /// Creates an analysis with the two required fields and empty details.
    pub fn new(summary: impl Into<String>, architecture_type: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            architecture_type: architecture_type.into(),
            tech_stack: Map::new(),
            languages: Vec::new(),
            frameworks: Vec::new(),
            dependencies: Map::new(),
            dependency_graph: BTreeMap::new(),
            quality_score: 0.0,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            recommendations: Vec::new(),
            risks: Vec::new(),
            security_concerns: Vec::new(),
            scalability: Map::new(),
            performance_bottlenecks: Vec::new(),
            deployment_recommendations: Vec::new(),
            monitoring_suggestions: Vec::new(),
        }
    }

    /// Sets the quality score, clamped into `[0, 10]`.
    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = if score.is_finite() {
            score.clamp(0.0, 10.0)
        } else {
            0.0
        };
        self
    }
}
