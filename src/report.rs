//! Report rendering and persistence.
//!
//! [`ReportSink`] is the last collaborator in the pipeline. The bundled
//! [`FileReportSink`] renders Markdown, JSON or HTML and writes
//! `{output_dir}/{name}.{ext}`, creating the directory on first use.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::constants::GENERATOR_VERSION;
use crate::error::ReportError;
use crate::types::{AnalysisResult, AppRecord, ReportFormat};

/// Persists a rendered report and returns where it went.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Renders and stores a report named `name` (no extension).
    ///
    /// The returned string locates the stored report, e.g. a file path.
    async fn save(
        &self,
        analysis: &AnalysisResult,
        records: &[AppRecord],
        name: &str,
        format: ReportFormat,
    ) -> Result<String, ReportError>;
}

/// Writes reports as files under one directory.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    output_dir: PathBuf,
}

impl FileReportSink {
    /// Creates a sink writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Target directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path a report named `name` would be written to.
    pub fn path_for(&self, name: &str, format: ReportFormat) -> PathBuf {
        self.output_dir.join(format!("{name}.{}", format.extension()))
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn save(
        &self,
        analysis: &AnalysisResult,
        records: &[AppRecord],
        name: &str,
        format: ReportFormat,
    ) -> Result<String, ReportError> {
        let content = render(analysis, records, format)?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.path_for(name, format);
        tokio::fs::write(&path, content).await?;
        tracing::info!(path = %path.display(), %format, "report written");
        Ok(path.display().to_string())
    }
}

/// Renders a report body in `format`.
pub fn render(
    analysis: &AnalysisResult,
    records: &[AppRecord],
    format: ReportFormat,
) -> Result<String, ReportError> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(analysis, records)),
        ReportFormat::Json => render_json(analysis, records),
        ReportFormat::Html => Ok(render_html(analysis, records)),
    }
}

/// Count of records per language, framework, deployment type and environment.
pub fn app_summary(records: &[AppRecord]) -> Value {
    fn tally<'a>(values: impl Iterator<Item = &'a Option<String>>) -> BTreeMap<&'a str, usize> {
        let mut counts = BTreeMap::new();
        for value in values.flatten() {
            *counts.entry(value.as_str()).or_insert(0) += 1;
        }
        counts
    }

    json!({
        "total_apps": records.len(),
        "languages": tally(records.iter().map(|r| &r.language)),
        "frameworks": tally(records.iter().map(|r| &r.framework)),
        "deployment_types": tally(records.iter().map(|r| &r.deployment_type)),
        "environments": tally(records.iter().map(|r| &r.environment)),
    })
}

/// Display name of each record mapped to the display names of the
/// dependencies that are themselves part of the batch.
pub fn dependency_matrix(records: &[AppRecord]) -> BTreeMap<String, Vec<String>> {
    let by_id: BTreeMap<&str, &AppRecord> =
        records.iter().map(|r| (r.app_id.as_str(), r)).collect();
    records
        .iter()
        .map(|record| {
            let deps = record
                .dependencies
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|dep| display_name(dep).to_string()))
                .collect();
            (display_name(record).to_string(), deps)
        })
        .collect()
}

fn display_name(record: &AppRecord) -> &str {
    if record.name.is_empty() {
        &record.app_id
    } else {
        &record.name
    }
}

fn render_json(analysis: &AnalysisResult, records: &[AppRecord]) -> Result<String, ReportError> {
    let report = json!({
        "metadata": {
            "generated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "total_apps": records.len(),
            "generator_version": GENERATOR_VERSION,
        },
        "architecture_analysis": analysis,
        "applications": records,
        "summary": {
            "app_summary": app_summary(records),
            "dependency_matrix": dependency_matrix(records),
        },
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

fn render_markdown(analysis: &AnalysisResult, records: &[AppRecord]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_markdown(&mut out, analysis, records);
    out
}

fn write_markdown(
    out: &mut String,
    analysis: &AnalysisResult,
    records: &[AppRecord],
) -> fmt::Result {
    writeln!(out, "# System Architecture Analysis Report\n")?;
    writeln!(
        out,
        "**Generated**: {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )?;

    writeln!(out, "## Overview")?;
    writeln!(out, "- **Applications**: {}", records.len())?;
    writeln!(out, "- **Architecture type**: {}", analysis.architecture_type)?;
    writeln!(out, "- **Quality score**: {}/10\n", analysis.quality_score)?;

    writeln!(out, "## Summary")?;
    writeln!(out, "{}\n", analysis.summary)?;

    writeln!(out, "## Technology Stack")?;
    if !analysis.languages.is_empty() {
        writeln!(out, "**Languages**: {}", analysis.languages.join(", "))?;
    }
    if !analysis.frameworks.is_empty() {
        writeln!(out, "**Frameworks**: {}", analysis.frameworks.join(", "))?;
    }
    writeln!(out)?;

    for (title, items) in [
        ("Strengths", &analysis.strengths),
        ("Weaknesses", &analysis.weaknesses),
        ("Recommendations", &analysis.recommendations),
        ("Security Concerns", &analysis.security_concerns),
        ("Performance Bottlenecks", &analysis.performance_bottlenecks),
    ] {
        if items.is_empty() {
            continue;
        }
        writeln!(out, "## {title}")?;
        for item in items {
            writeln!(out, "- {item}")?;
        }
        writeln!(out)?;
    }

    if !analysis.risks.is_empty() {
        writeln!(out, "## Risks")?;
        for risk in &analysis.risks {
            let (kind, severity, description) = risk_fields(risk);
            writeln!(out, "- **{kind}** ({severity}): {description}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Applications")?;
    for record in records {
        writeln!(out, "### {}", display_name(record))?;
        writeln!(out, "- **ID**: {}", record.app_id)?;
        if let Some(description) = &record.description {
            writeln!(out, "- **Description**: {description}")?;
        }
        if let Some(language) = &record.language {
            writeln!(out, "- **Language**: {language}")?;
        }
        if let Some(framework) = &record.framework {
            writeln!(out, "- **Framework**: {framework}")?;
        }
        if !record.dependencies.is_empty() {
            writeln!(out, "- **Dependencies**: {}", record.dependencies.join(", "))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn risk_fields(risk: &Value) -> (&str, &str, &str) {
    fn field<'a>(risk: &'a Value, key: &str, default: &'a str) -> &'a str {
        risk.get(key).and_then(Value::as_str).unwrap_or(default)
    }
    (
        field(risk, "risk_type", "unknown risk"),
        field(risk, "severity", "medium"),
        field(risk, "description", ""),
    )
}

const HTML_STYLE: &str = "\
body { font-family: 'Segoe UI', Tahoma, sans-serif; line-height: 1.6; color: #333; \
max-width: 1200px; margin: 0 auto; padding: 20px; background: #f5f5f5; }
.container { background: #fff; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
h1, h2, h3 { color: #2c3e50; }
.score { font-weight: bold; }
.score-high { color: #27ae60; }
.score-medium { color: #f39c12; }
.score-low { color: #e74c3c; }";

fn render_html(analysis: &AnalysisResult, records: &[AppRecord]) -> String {
    let mut out = String::new();
    let _ = write_html(&mut out, analysis, records);
    out
}

fn write_html(out: &mut String, analysis: &AnalysisResult, records: &[AppRecord]) -> fmt::Result {
    let score_class = match analysis.quality_score {
        s if s >= 7.0 => "score-high",
        s if s >= 4.0 => "score-medium",
        _ => "score-low",
    };

    writeln!(out, "<!DOCTYPE html>\n<html lang=\"en\">\n<head>")?;
    writeln!(out, "<meta charset=\"UTF-8\">")?;
    writeln!(out, "<title>System Architecture Analysis Report</title>")?;
    writeln!(out, "<style>\n{HTML_STYLE}\n</style>\n</head>\n<body>\n<div class=\"container\">")?;
    writeln!(out, "<h1>System Architecture Analysis Report</h1>")?;
    writeln!(out, "<ul>")?;
    writeln!(out, "<li><strong>Applications</strong>: {}</li>", records.len())?;
    writeln!(
        out,
        "<li><strong>Architecture type</strong>: {}</li>",
        escape_html(&analysis.architecture_type)
    )?;
    writeln!(
        out,
        "<li><strong>Quality score</strong>: <span class=\"score {score_class}\">{}/10</span></li>",
        analysis.quality_score
    )?;
    writeln!(out, "</ul>")?;
    writeln!(out, "<h2>Summary</h2>\n<p>{}</p>", escape_html(&analysis.summary))?;

    for (title, items) in [
        ("Languages", &analysis.languages),
        ("Frameworks", &analysis.frameworks),
        ("Strengths", &analysis.strengths),
        ("Weaknesses", &analysis.weaknesses),
        ("Recommendations", &analysis.recommendations),
        ("Security Concerns", &analysis.security_concerns),
    ] {
        if items.is_empty() {
            continue;
        }
        writeln!(out, "<h2>{title}</h2>\n<ul>")?;
        for item in items {
            writeln!(out, "<li>{}</li>", escape_html(item))?;
        }
        writeln!(out, "</ul>")?;
    }

    if !analysis.risks.is_empty() {
        writeln!(out, "<h2>Risks</h2>\n<ul>")?;
        for risk in &analysis.risks {
            let (kind, severity, description) = risk_fields(risk);
            writeln!(
                out,
                "<li><strong>{}</strong> ({}): {}</li>",
                escape_html(kind),
                escape_html(severity),
                escape_html(description)
            )?;
        }
        writeln!(out, "</ul>")?;
    }

    writeln!(out, "<h2>Applications</h2>")?;
    for record in records {
        writeln!(out, "<h3>{}</h3>\n<ul>", escape_html(display_name(record)))?;
        writeln!(out, "<li><strong>ID</strong>: {}</li>", escape_html(&record.app_id))?;
        for (label, value) in [
            ("Description", &record.description),
            ("Language", &record.language),
            ("Framework", &record.framework),
        ] {
            if let Some(value) = value {
                writeln!(out, "<li><strong>{label}</strong>: {}</li>", escape_html(value))?;
            }
        }
        if !record.dependencies.is_empty() {
            writeln!(
                out,
                "<li><strong>Dependencies</strong>: {}</li>",
                escape_html(&record.dependencies.join(", "))
            )?;
        }
        writeln!(out, "</ul>")?;
    }

    writeln!(out, "</div>\n</body>\n</html>")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
