//! Stage-sequencing orchestrator.
//!
//! [`PipelineOrchestrator`] runs one task per submission through
//! `Collecting → Processing → Analyzing → GeneratingReport → Completed`,
//! publishing every transition to its [`TaskRegistry`] so that pollers can
//! follow along. Any failure, including a panic inside a collaborator,
//! becomes an unsuccessful [`TaskResult`]; nothing is raised to the caller.
//!
//! The task leaves the registry before `run` returns or the [`TaskHandle`]
//! resolves. Its terminal snapshot stays reachable through
//! [`TaskResult::progress_history`] and through
//! [`get_result`](PipelineOrchestrator::get_result) while the result cache
//! retains it.
//!
//! # Cancellation
//!
//! [`cancel`](PipelineOrchestrator::cancel) removes a tracked task from the
//! registry and trips its [`CancellationToken`]. The
//! running task notices the token at its next stage boundary and stops
//! there. Calls already in flight are allowed to finish.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::collector::{BatchCollector, CollectionGateway};
use crate::config::PipelineConfig;
use crate::constants::{ERROR_KIND_META_KEY, REPORT_NAME_PREFIX};
use crate::error::PipelineError;
use crate::registry::{InMemoryTaskRegistry, TaskRegistry};
use crate::report::ReportSink;
use crate::results::ResultCache;
use crate::types::{AnalysisResult, AppRecord, ProgressRecord, ReportFormat, Stage, TaskResult};
use crate::validator;

/// Coordinates collection, cleaning, analysis and reporting for batches of
/// application identifiers.
///
/// Cloning is cheap and every clone shares the same registry and result
/// cache.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use archi_pipeline::collector::CollectionGateway;
/// # use archi_pipeline::analyzer::Analyzer;
/// # use archi_pipeline::report::ReportSink;
/// use archi_pipeline::{PipelineConfig, PipelineOrchestrator, ReportFormat};
///
/// # async fn demo(
/// #     gateway: Arc<dyn CollectionGateway>,
/// #     analyzer: Arc<dyn Analyzer>,
/// #     sink: Arc<dyn ReportSink>,
/// # ) {
/// let config = PipelineConfig::default();
/// let orchestrator = PipelineOrchestrator::new(config, gateway, analyzer, sink);
///
/// let ids = vec!["billing".to_string(), "ledger".to_string()];
/// let handle = orchestrator.submit(ids, ReportFormat::Json, true);
/// if let Some(progress) = orchestrator.get_progress(handle.task_id()) {
///     println!("{} at {:.0}%", progress.stage, progress.progress * 100.0);
/// }
/// let result = handle.wait().await;
/// println!("success: {}", result.success);
/// # }
/// ```
#[derive(Clone)]
pub struct PipelineOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<PipelineConfig>,
    registry: Arc<dyn TaskRegistry>,
    collector: BatchCollector,
    analyzer: Arc<dyn Analyzer>,
    sink: Arc<dyn ReportSink>,
    results: ResultCache,
    cancellations: DashMap<String, CancellationToken>,
}

/// Handle to a task started with [`PipelineOrchestrator::submit`].
pub struct TaskHandle {
    task_id: String,
    join: JoinHandle<TaskResult>,
    orchestrator: PipelineOrchestrator,
}

impl TaskHandle {
    /// Id of the running task, usable for polling immediately.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns `true` once the task has produced its result.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the task to finish.
    ///
    /// If the runtime tears the task down before it finishes, the returned
    /// result is unsuccessful with an internal error.
    pub async fn wait(self) -> TaskResult {
        match self.join.await {
            Ok(result) => result,
            Err(e) => self
                .orchestrator
                .abandon(&self.task_id, PipelineError::Internal(e.to_string())),
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id)
            .field("finished", &self.join.is_finished())
            .finish()
    }
}

// Writer-side state of one running task.
struct TaskContext {
    progress: ProgressRecord,
    history: Vec<ProgressRecord>,
    tracked: bool,
    token: CancellationToken,
    started: Instant,
}

impl TaskContext {
    fn task_id(&self) -> &str {
        &self.progress.task_id
    }

    // Records the current snapshot and mirrors it into the registry.
    // Updates for removed tasks are dropped; a terminal entry is never
    // overwritten.
    fn publish(&mut self, registry: &dyn TaskRegistry) {
        self.history.push(self.progress.clone());
        if self.tracked {
            let snapshot = &self.progress;
            registry.update(&snapshot.task_id, &mut |entry| {
                if !entry.is_terminal() {
                    *entry = snapshot.clone();
                }
            });
        }
    }
}

struct Completion {
    analysis: AnalysisResult,
    report_location: String,
    records: Vec<AppRecord>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with an in-memory task registry.
    pub fn new(
        config: PipelineConfig,
        gateway: Arc<dyn CollectionGateway>,
        analyzer: Arc<dyn Analyzer>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self::with_registry(
            config,
            gateway,
            analyzer,
            sink,
            Arc::new(InMemoryTaskRegistry::new()),
        )
    }

    /// Creates an orchestrator backed by a caller-supplied registry.
    pub fn with_registry(
        config: PipelineConfig,
        gateway: Arc<dyn CollectionGateway>,
        analyzer: Arc<dyn Analyzer>,
        sink: Arc<dyn ReportSink>,
        registry: Arc<dyn TaskRegistry>,
    ) -> Self {
        let collector = BatchCollector::new(
            gateway,
            config.processing.batch_size,
            config.processing.max_concurrent,
        );
        let results = ResultCache::new(config.processing.result_cache_capacity);
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                registry,
                collector,
                analyzer,
                sink,
                results,
                cancellations: DashMap::new(),
            }),
        }
    }

    /// The configuration this orchestrator was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Runs a task to completion in the caller's task.
    ///
    /// With `track_progress` the task is visible to
    /// [`get_progress`](Self::get_progress), [`list_active`](Self::list_active)
    /// and [`cancel`](Self::cancel) while it runs.
    pub async fn run(
        &self,
        ids: Vec<String>,
        format: ReportFormat,
        track_progress: bool,
    ) -> TaskResult {
        let ctx = self.start(ids.len(), format, track_progress);
        self.execute(ctx, ids, format).await
    }

    /// Registers a task and runs it on the tokio runtime.
    ///
    /// The returned handle carries the task id immediately; when tracking is
    /// on, the task is already registered when this returns.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        ids: Vec<String>,
        format: ReportFormat,
        track_progress: bool,
    ) -> TaskHandle {
        let ctx = self.start(ids.len(), format, track_progress);
        let task_id = ctx.task_id().to_string();
        let orchestrator = self.clone();
        let join = tokio::spawn(async move { orchestrator.execute(ctx, ids, format).await });
        TaskHandle {
            task_id,
            join,
            orchestrator: self.clone(),
        }
    }

    /// Live snapshot of a running tracked task.
    ///
    /// Finished, cancelled and untracked tasks return `None`.
    pub fn get_progress(&self, task_id: &str) -> Option<ProgressRecord> {
        self.inner.registry.get(task_id)
    }

    /// Result of a finished task, while the result cache retains it.
    pub fn get_result(&self, task_id: &str) -> Option<TaskResult> {
        self.inner.results.get(task_id)
    }

    /// Snapshots of all running tracked tasks, oldest first.
    pub fn list_active(&self) -> Vec<ProgressRecord> {
        self.inner.registry.list()
    }

    /// Cancels a running tracked task.
    ///
    /// Returns `false` if `task_id` is not in the registry or has already
    /// reached a terminal stage. On success the entry is removed before any
    /// further update can land on it, so pollers see no progress after this
    /// returns. The task stops at its next stage boundary and its result
    /// reports the cancellation.
    pub fn cancel(&self, task_id: &str) -> bool {
        let Some(record) = self.inner.registry.remove(task_id) else {
            return false;
        };
        if record.is_terminal() {
            tracing::debug!(task_id, stage = %record.stage, "cancel raced task completion");
            return false;
        }
        if let Some((_, token)) = self.inner.cancellations.remove(task_id) {
            token.cancel();
        }
        tracing::info!(
            task_id,
            stage = %record.stage,
            progress = record.progress,
            "task cancelled"
        );
        true
    }

    fn start(&self, id_count: usize, format: ReportFormat, track_progress: bool) -> TaskContext {
        let mut progress = ProgressRecord::new(Uuid::new_v4().to_string());
        progress
            .metadata
            .insert("app_count".to_string(), Value::from(id_count));
        progress
            .metadata
            .insert("report_format".to_string(), Value::from(format.to_string()));

        let token = CancellationToken::new();
        let mut tracked = false;
        if track_progress {
            match self.inner.registry.register(progress.clone()) {
                Ok(()) => {
                    tracked = true;
                    self.inner
                        .cancellations
                        .insert(progress.task_id.clone(), token.clone());
                },
                Err(e) => tracing::warn!(error = %e, "running task without progress tracking"),
            }
        }

        tracing::info!(
            task_id = %progress.task_id,
            app_count = id_count,
            tracked,
            "architecture analysis task created"
        );
        TaskContext {
            history: vec![progress.clone()],
            progress,
            tracked,
            token,
            started: Instant::now(),
        }
    }

    async fn execute(
        &self,
        mut ctx: TaskContext,
        ids: Vec<String>,
        format: ReportFormat,
    ) -> TaskResult {
        let outcome = AssertUnwindSafe(self.run_stages(&mut ctx, &ids, format))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Internal(panic_message(panic.as_ref()))));
        self.finish(ctx, outcome)
    }

    async fn run_stages(
        &self,
        ctx: &mut TaskContext,
        ids: &[String],
        format: ReportFormat,
    ) -> Result<Completion, PipelineError> {
        let inner = &self.inner;
        let processing = &inner.config.processing;

        if ids.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        if ids.len() > processing.max_identifiers {
            return Err(PipelineError::TooManyIdentifiers {
                count: ids.len(),
                limit: processing.max_identifiers,
            });
        }

        self.transition(ctx, Stage::Collecting, "collecting application data")?;
        if processing.check_gateway_health && !inner.collector.gateway().health_check().await {
            return Err(PipelineError::GatewayUnhealthy);
        }
        let registry = inner.registry.as_ref();
        let collected = inner
            .collector
            .collect(ids, |chunk| {
                ctx.progress.advance(
                    chunk.stage_progress(),
                    format!(
                        "collected chunk {}/{} ({} records, {} failed)",
                        chunk.completed, chunk.total, chunk.collected, chunk.failed
                    ),
                );
                ctx.publish(registry);
            })
            .await;
        if collected.is_empty() {
            return Err(PipelineError::NothingCollected);
        }
        tracing::info!(
            task_id = %ctx.task_id(),
            requested = ids.len(),
            collected = collected.len(),
            "collection finished"
        );

        self.transition(ctx, Stage::Processing, "validating and cleaning records")?;
        let records = validator::clean_records(collected);
        if records.is_empty() {
            return Err(PipelineError::NothingValid);
        }

        self.transition(ctx, Stage::Analyzing, "analyzing architecture")?;
        let analysis = inner.analyzer.analyze(&records).await?;

        self.transition(ctx, Stage::GeneratingReport, "generating report")?;
        let name = format!("{REPORT_NAME_PREFIX}{}", ctx.task_id());
        let report_location = inner.sink.save(&analysis, &records, &name, format).await?;

        self.transition(ctx, Stage::Completed, "architecture analysis completed")?;
        Ok(Completion {
            analysis,
            report_location,
            records,
        })
    }

    fn transition(
        &self,
        ctx: &mut TaskContext,
        stage: Stage,
        message: &str,
    ) -> Result<(), PipelineError> {
        if ctx.token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        ctx.progress
            .enter(stage, message)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        tracing::info!(
            task_id = %ctx.task_id(),
            stage = %stage,
            progress = ctx.progress.progress,
            "{}",
            message
        );
        ctx.publish(self.inner.registry.as_ref());
        Ok(())
    }

    fn finish(
        &self,
        mut ctx: TaskContext,
        outcome: Result<Completion, PipelineError>,
    ) -> TaskResult {
        let elapsed = ctx.started.elapsed();
        let task_id = ctx.task_id().to_string();

        let result = match outcome {
            Ok(done) => {
                tracing::info!(
                    task_id = %task_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "task completed"
                );
                TaskResult {
                    task_id: task_id.clone(),
                    success: true,
                    analysis: Some(done.analysis),
                    report_location: Some(done.report_location),
                    records: done.records,
                    error_message: None,
                    elapsed,
                    progress_history: Vec::new(),
                }
            },
            Err(e) => {
                let error_message = e.to_string();
                tracing::error!(
                    task_id = %task_id,
                    kind = e.kind(),
                    error = %error_message,
                    "task failed"
                );
                ctx.progress.fail("architecture analysis failed", error_message.clone());
                ctx.progress
                    .metadata
                    .insert(ERROR_KIND_META_KEY.to_string(), Value::from(e.kind()));
                ctx.publish(self.inner.registry.as_ref());
                TaskResult {
                    task_id: task_id.clone(),
                    success: false,
                    analysis: None,
                    report_location: None,
                    records: Vec::new(),
                    error_message: Some(error_message),
                    elapsed,
                    progress_history: Vec::new(),
                }
            },
        };

        self.inner.registry.remove(&task_id);
        self.inner.cancellations.remove(&task_id);

        let result = TaskResult {
            progress_history: ctx.history,
            ..result
        };
        self.inner.results.insert(result.clone());
        result
    }

    // Result for a task whose future never produced one.
    fn abandon(&self, task_id: &str, error: PipelineError) -> TaskResult {
        let mut progress = self
            .inner
            .registry
            .remove(task_id)
            .unwrap_or_else(|| ProgressRecord::new(task_id));
        self.inner.cancellations.remove(task_id);

        let error_message = error.to_string();
        tracing::error!(task_id, error = %error_message, "task abandoned");
        progress.fail("architecture analysis failed", error_message.clone());
        progress
            .metadata
            .insert(ERROR_KIND_META_KEY.to_string(), Value::from(error.kind()));

        let elapsed = (chrono::Utc::now() - progress.start_time)
            .to_std()
            .unwrap_or_default();
        let result = TaskResult {
            task_id: task_id.to_string(),
            success: false,
            analysis: None,
            report_location: None,
            records: Vec::new(),
            error_message: Some(error_message),
            elapsed,
            progress_history: vec![progress],
        };
        self.inner.results.insert(result.clone());
        result
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("collector", &self.inner.collector)
            .field("active_tasks", &self.inner.registry.len())
            .field("cached_results", &self.inner.results.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("stage panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("stage panicked: {message}")
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnalysisError, ReportError};
    use crate::types::CollectionOutcome;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::Map;

    struct EchoGateway;

    #[async_trait]
    impl CollectionGateway for EchoGateway {
        async fn fetch(&self, app_id: &str) -> CollectionOutcome {
            CollectionOutcome::collected(AppRecord::new(app_id, format!(" {app_id} ")))
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    struct PanickingAnalyzer;

    #[async_trait]
    impl Analyzer for PanickingAnalyzer {
        async fn analyze(&self, _records: &[AppRecord]) -> Result<AnalysisResult, AnalysisError> {
            panic!("model client exploded")
        }

        async fn analyze_one(
            &self,
            _record: &AppRecord,
        ) -> Result<Map<String, Value>, AnalysisError> {
            Err(AnalysisError::EmptyInput)
        }
    }

    struct NullSink;

    #[async_trait]
    impl ReportSink for NullSink {
        async fn save(
            &self,
            _analysis: &AnalysisResult,
            _records: &[AppRecord],
            name: &str,
            _format: ReportFormat,
        ) -> Result<String, ReportError> {
            Ok(format!("mem://{name}"))
        }
    }

    fn orchestrator(config: PipelineConfig) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            config,
            Arc::new(EchoGateway),
            Arc::new(PanickingAnalyzer),
            Arc::new(NullSink),
        )
    }

    #[tokio::test]
    async fn analyzer_panic_becomes_failed_result() {
        let orchestrator = orchestrator(PipelineConfig::default());
        let result = orchestrator
            .run(vec!["a1".to_string()], ReportFormat::Markdown, true)
            .await;

        assert!(!result.success);
        let error = result.error_message.as_deref().unwrap();
        assert!(error.contains("model client exploded"), "{error}");
        let last = result.final_progress().unwrap();
        assert_eq!(last.stage, Stage::Failed);
        assert_eq!(last.metadata[ERROR_KIND_META_KEY], Value::from("internal"));
        assert!(orchestrator.list_active().is_empty());
    }

    #[tokio::test]
    async fn unhealthy_gateway_fails_fast_when_probing() {
        let mut config = PipelineConfig::default();
        config.processing.check_gateway_health = true;
        let result = orchestrator(config)
            .run(vec!["a1".to_string()], ReportFormat::Markdown, false)
            .await;
        assert_eq!(
            result.error_message.as_deref(),
            Some("collection gateway failed its health check")
        );
    }

    #[tokio::test]
    async fn too_many_identifiers_rejected_before_collecting() {
        let mut config = PipelineConfig::default();
        config.processing.max_identifiers = 2;
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = orchestrator(config).run(ids, ReportFormat::Markdown, true).await;

        assert!(!result.success);
        let stages: Vec<Stage> = result.progress_history.iter().map(|p| p.stage).collect();
        assert_eq!(stages, vec![Stage::Initialized, Stage::Failed]);
    }

    #[tokio::test]
    async fn failed_results_are_cached() {
        let orchestrator = orchestrator(PipelineConfig::default());
        let result = orchestrator.run(Vec::new(), ReportFormat::Json, true).await;
        let cached = orchestrator.get_result(&result.task_id).unwrap();
        assert_eq!(cached, result);
        assert!(orchestrator.get_progress(&result.task_id).is_none());
    }

    fn completed_record(task_id: &str) -> ProgressRecord {
        let mut record = ProgressRecord::new(task_id);
        for stage in [
            Stage::Collecting,
            Stage::Processing,
            Stage::Analyzing,
            Stage::GeneratingReport,
            Stage::Completed,
        ] {
            record.enter(stage, stage.to_string()).unwrap();
        }
        record
    }

    #[test]
    fn cancel_refuses_a_task_that_already_completed() {
        let registry = Arc::new(InMemoryTaskRegistry::new());
        registry.register(completed_record("done")).unwrap();
        let orchestrator = PipelineOrchestrator::with_registry(
            PipelineConfig::default(),
            Arc::new(EchoGateway),
            Arc::new(PanickingAnalyzer),
            Arc::new(NullSink),
            registry.clone(),
        );

        assert!(!orchestrator.cancel("done"));
        assert!(registry.get("done").is_none());
    }

    #[test]
    fn publish_never_overwrites_a_terminal_entry() {
        let registry = InMemoryTaskRegistry::new();
        let mut failed = ProgressRecord::new("t1");
        failed.fail("task cancelled", "task cancelled by caller");
        registry.register(failed).unwrap();

        let mut progress = ProgressRecord::new("t1");
        progress.enter(Stage::Collecting, "collecting").unwrap();
        let mut ctx = TaskContext {
            history: Vec::new(),
            progress,
            tracked: true,
            token: CancellationToken::new(),
            started: Instant::now(),
        };
        ctx.publish(&registry);

        let entry = registry.get("t1").unwrap();
        assert_eq!(entry.stage, Stage::Failed);
        assert_eq!(entry.progress, 1.0);
        assert_eq!(ctx.history.len(), 1);
    }

    #[test]
    fn panic_message_extracts_payload() {
        assert_eq!(panic_message(&"boom"), "stage panicked: boom");
        assert_eq!(panic_message(&String::from("bang")), "stage panicked: bang");
        assert_eq!(panic_message(&42_u8), "stage panicked");
    }
}
