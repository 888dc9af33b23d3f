//! The per-request decision and composition pass.

use std::path::Path;
use std::sync::Arc;

use cml_core::{
    CompositionResult, ConditionalEvaluator, Decision, EngineConfig, EngineError, PassPhase,
    PassTiming, RequestContext, ScriptOutput, ServingPipeline,
};
use cml_observability::{Diagnostic, DiagnosticLevel, DiagnosticSink, TracingSink};
use cml_script::{ScriptEnvironment, ScriptExecutor};
use tracing::instrument;

use crate::conditional::HttpConditional;
use crate::redirect::MissRedirector;
use crate::resolver::ConditionalResolver;
use crate::store::{BackingStore, FsBackingStore};
use crate::validator::{Freshness, FreshnessValidator};

/// Runs policy scripts and applies their decision to a serving pipeline.
///
/// Holds only immutable configuration and shared handles, so one engine can
/// serve concurrent requests. Paths are resolved against the cache base
/// carried by each [`RequestContext`]; use [`CacheEngine::request_context`]
/// to seed it from the configuration.
#[derive(Clone)]
pub struct CacheEngine {
    config: EngineConfig,
    executor: ScriptExecutor,
    store: Arc<dyn BackingStore>,
    evaluator: Arc<dyn ConditionalEvaluator>,
    sink: Arc<dyn DiagnosticSink>,
}

impl CacheEngine {
    /// Create an engine over the local filesystem.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            executor: ScriptExecutor::from_config(&config),
            config,
            store: Arc::new(FsBackingStore),
            evaluator: Arc::new(HttpConditional),
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the script executor.
    pub fn with_executor(mut self, executor: ScriptExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the backing store.
    pub fn with_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the conditional-GET evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionalEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replace the diagnostic sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The script executor.
    pub fn executor(&self) -> &ScriptExecutor {
        &self.executor
    }

    /// A request context carrying the configured cache base.
    pub fn request_context(&self, request_uri: impl Into<String>) -> RequestContext {
        RequestContext::new(request_uri)
            .with_cache_base(&self.config.cache_base_dir, &self.config.cache_base_url)
    }

    /// Run one pass with the policy script at `script`.
    pub fn run(
        &self,
        ctx: &RequestContext,
        script: &Path,
        pipeline: &mut dyn ServingPipeline,
    ) -> CompositionResult {
        let name = script.display().to_string();
        self.pass(ctx, &name, pipeline, |env| self.executor.execute(script, env))
    }

    /// Run one pass with in-memory script source.
    pub fn run_source(
        &self,
        ctx: &RequestContext,
        name: &str,
        source: &str,
        pipeline: &mut dyn ServingPipeline,
    ) -> CompositionResult {
        self.pass(ctx, name, pipeline, |env| {
            self.executor.execute_source(name, source, env)
        })
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id, script = %name))]
    fn pass<F>(
        &self,
        ctx: &RequestContext,
        name: &str,
        pipeline: &mut dyn ServingPipeline,
        execute: F,
    ) -> CompositionResult
    where
        F: FnOnce(&ScriptEnvironment) -> Result<ScriptOutput, EngineError>,
    {
        let mut timing = PassTiming::new();

        let env = ScriptEnvironment::bind(ctx);
        timing.mark(PassPhase::Bind);

        let output = match execute(&env) {
            Ok(output) => output,
            Err(err) => return self.fail(ctx, pipeline, &mut timing, err, 0),
        };
        timing.mark(PassPhase::Execute);

        let mut aggregated_mtime = 0;
        if output.decision == Decision::Hit {
            let report = FreshnessValidator::new(self.store.as_ref(), &ctx.cache_base_dir)
                .validate(&output.include_list, output.handler());
            timing.mark(PassPhase::Validate);
            aggregated_mtime = report.aggregated_mtime;

            match report.freshness {
                Freshness::Fresh => {
                    let resolution = ConditionalResolver::new(self.evaluator.as_ref()).resolve(
                        pipeline,
                        report.body_chunks(),
                        aggregated_mtime,
                        output.output_content_type.as_deref(),
                    );
                    timing.mark(PassPhase::Resolve);
                    tracing::debug!(
                        outcome = ?resolution.outcome,
                        files = resolution.body_chunks.len(),
                        aggregated_mtime,
                        elapsed_us = timing.elapsed_us(),
                        "served from cache"
                    );
                    return CompositionResult {
                        decision: Decision::Hit,
                        aggregated_mtime,
                        body_chunks: resolution.body_chunks,
                        last_modified: resolution.last_modified,
                        outcome: resolution.outcome,
                    };
                }
                Freshness::Stale { missing } => {
                    self.sink.emit(
                        Diagnostic::new(
                            DiagnosticLevel::Info,
                            &ctx.request_id,
                            "backing file missing, calling trigger handler",
                        )
                        .with_subject(missing)
                        .field("script", name)
                        .field_i64("validated", report.validated.len() as i64)
                        .with_elapsed_us(timing.elapsed_us()),
                    );
                }
                Freshness::Failed(err) => {
                    return self.fail(ctx, pipeline, &mut timing, err, aggregated_mtime);
                }
            }
        }

        // Reached on a script MISS or a downgraded HIT.
        let Some(handler) = output.handler() else {
            let err = EngineError::NoHandlerConfiguredForMiss {
                script: name.to_string(),
            };
            return self.fail(ctx, pipeline, &mut timing, err, aggregated_mtime);
        };

        let target = MissRedirector::new(&ctx.cache_base_url, &ctx.cache_base_dir)
            .redirect(pipeline, handler);
        timing.mark(PassPhase::Redirect);
        tracing::debug!(
            logical_path = %target.logical_path,
            physical_path = %target.physical_path,
            elapsed_us = timing.elapsed_us(),
            "re-dispatching to trigger handler"
        );

        CompositionResult::regenerate(target, aggregated_mtime)
    }

    fn fail(
        &self,
        ctx: &RequestContext,
        pipeline: &mut dyn ServingPipeline,
        timing: &mut PassTiming,
        err: EngineError,
        aggregated_mtime: i64,
    ) -> CompositionResult {
        pipeline.reset_body();
        timing.mark(PassPhase::Error);
        self.sink.emit(
            Diagnostic::failure(&ctx.request_id, &err)
                .field("request_uri", ctx.request_uri.as_str())
                .field("phases", timing.trail())
                .with_elapsed_us(timing.elapsed_us()),
        );
        CompositionResult::failed(err, aggregated_mtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordingStore;
    use cml_core::{FailureKind, MemoryPipeline, Outcome, ResponseState};
    use cml_observability::RecordingSink;

    fn engine(store: RecordingStore, sink: Arc<RecordingSink>) -> CacheEngine {
        CacheEngine::new(EngineConfig::new("/c/", "/cml/"))
            .with_store(Arc::new(store))
            .with_sink(sink)
    }

    fn pipeline() -> MemoryPipeline {
        MemoryPipeline::new("/index.cml", "/www/index.cml")
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CacheEngine>();
    }

    #[test]
    fn test_hit_composes_body() {
        let sink = Arc::new(RecordingSink::new());
        let engine = engine(
            RecordingStore::new()
                .with_file("/c/a.html", 100, 3)
                .with_file("/c/b.html", 200, 4),
            sink.clone(),
        );
        let ctx = engine.request_context("/index.cml");
        let mut pipeline = pipeline();

        let result = engine.run_source(
            &ctx,
            "index.rhai",
            r#"output_include = ["a.html", "b.html"]; CACHE_HIT"#,
            &mut pipeline,
        );

        assert_eq!(result.decision, Decision::Hit);
        assert_eq!(result.outcome, Outcome::Composed);
        assert_eq!(result.aggregated_mtime, 200);
        assert_eq!(result.body_length(), 7);
        assert_eq!(pipeline.body.len(), 2);
        assert_eq!(pipeline.state, ResponseState::Complete);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_downgrade_emits_info_and_redirects() {
        let sink = Arc::new(RecordingSink::new());
        let store = RecordingStore::new().with_file("/c/x.html", 100, 3);
        let engine = engine(store, sink.clone());
        let ctx = engine.request_context("/index.cml");
        let mut pipeline = pipeline();

        let result = engine.run_source(
            &ctx,
            "index.rhai",
            r#"output_include = ["missing.html", "x.html"]; trigger_handler = "gen.rhai"; 0"#,
            &mut pipeline,
        );

        assert_eq!(result.decision, Decision::Miss);
        assert_eq!(pipeline.logical_path, "/cml/gen.rhai");
        assert_eq!(pipeline.physical_path, "/c/gen.rhai");

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, DiagnosticLevel::Info);
        assert_eq!(entries[0].subject.as_deref(), Some("/c/missing.html"));
        assert!(sink.failures().is_empty());
    }

    #[test]
    fn test_miss_without_handler_is_error() {
        let sink = Arc::new(RecordingSink::new());
        let engine = engine(RecordingStore::new(), sink.clone());
        let ctx = engine.request_context("/index.cml");
        let mut pipeline = pipeline();

        let result = engine.run_source(&ctx, "index.rhai", "output_include = []; CACHE_MISS", &mut pipeline);

        assert_eq!(result.decision, Decision::Error);
        assert_eq!(
            result.error().map(EngineError::kind),
            Some(FailureKind::NoHandlerConfiguredForMiss)
        );
        assert_eq!(pipeline.rewrites, 0);

        let failures = sink.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subject.as_deref(), Some("index.rhai"));
        assert_eq!(
            failures[0].fields.get("phases").and_then(|v| v.as_str()),
            Some("bind,execute,error")
        );
        assert_eq!(failures[0].request_id, ctx.request_id.to_string());
    }

    #[test]
    fn test_script_miss_skips_validation() {
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(RecordingStore::new());
        let engine = engine(RecordingStore::new(), sink.clone()).with_store(store.clone());
        let ctx = engine.request_context("/index.cml");
        let mut pipeline = pipeline();

        let result = engine.run_source(
            &ctx,
            "index.rhai",
            r#"output_include = ["gone.html", "x.html"]; trigger_handler = "gen.rhai"; CACHE_MISS"#,
            &mut pipeline,
        );

        assert_eq!(result.decision, Decision::Miss);
        assert!(store.queried().is_empty());
        assert_eq!(pipeline.logical_path, "/cml/gen.rhai");
        assert_eq!(pipeline.physical_path, "/c/gen.rhai");
        assert_eq!(pipeline.rewrites, 1);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_script_miss_without_handler_skips_validation() {
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(RecordingStore::new());
        let engine = engine(RecordingStore::new(), sink.clone()).with_store(store.clone());
        let ctx = engine.request_context("/index.cml");
        let mut pipeline = pipeline();

        let result = engine.run_source(
            &ctx,
            "index.rhai",
            r#"output_include = ["gone.html", "x.html"]; CACHE_MISS"#,
            &mut pipeline,
        );

        assert_eq!(result.decision, Decision::Error);
        assert_eq!(
            result.error().map(EngineError::kind),
            Some(FailureKind::NoHandlerConfiguredForMiss)
        );
        assert!(store.queried().is_empty());
        assert_eq!(pipeline.rewrites, 0);
        assert_eq!(sink.failures().len(), 1);
    }

    #[test]
    fn test_stat_error_is_error() {
        let sink = Arc::new(RecordingSink::new());
        let store = RecordingStore::new()
            .with_file("/c/a.html", 100, 3)
            .with_failure("/c/b.html", std::io::ErrorKind::PermissionDenied);
        let engine = engine(store, sink.clone());
        let ctx = engine.request_context("/index.cml");
        let mut pipeline = pipeline();

        let result = engine.run_source(
            &ctx,
            "index.rhai",
            r#"output_include = ["a.html", "b.html"]; trigger_handler = "gen"; 0"#,
            &mut pipeline,
        );

        assert_eq!(result.decision, Decision::Error);
        assert_eq!(result.aggregated_mtime, 100);
        assert!(result.body_chunks.is_empty());
        assert!(pipeline.body.is_empty());
        assert_eq!(sink.failures()[0].kind, Some(FailureKind::BackingFileStat));
    }
}
