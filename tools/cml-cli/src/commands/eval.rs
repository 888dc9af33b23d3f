//! Run one decision and composition pass.

use std::fs::File;
use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Utc};
use cml_core::{
    BodyChunk, CacheMissTarget, CompositionResult, Decision, EngineConfig, FailureKind,
    MemoryPipeline, Outcome,
};
use cml_engine::CacheEngine;
use cml_observability::{Diagnostic, RecordingSink};
use http::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use http::Method;
use serde::Serialize;

use super::EvalArgs;
use crate::context::Context;
use crate::output::{decision_badge, format_bytes};

/// Everything one pass produced, for display.
#[derive(Debug, Serialize)]
pub struct EvalReport {
    pub script: String,
    pub request_uri: String,
    pub decision: Decision,
    pub outcome: &'static str,
    pub aggregated_mtime: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub body_chunks: Vec<BodyChunk>,
    pub body_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<CacheMissTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub evaluated_at: DateTime<Utc>,
}

impl EvalReport {
    fn new(
        script: String,
        request_uri: String,
        result: CompositionResult,
        pipeline: &MemoryPipeline,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let outcome = match &result.outcome {
            Outcome::Composed => "composed",
            Outcome::NotModified => "not_modified",
            Outcome::Regenerate(_) => "regenerate",
            Outcome::Failed(_) => "failed",
        };

        Self {
            script,
            request_uri,
            decision: result.decision,
            outcome,
            aggregated_mtime: result.aggregated_mtime,
            last_modified: result.last_modified.clone(),
            content_type: pipeline
                .response_headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body_length: result.body_length(),
            target: result.miss_target().cloned(),
            error_kind: result.error().map(|e| e.kind()),
            error: result.error().map(|e| e.to_string()),
            body_chunks: result.body_chunks,
            diagnostics,
            evaluated_at: Utc::now(),
        }
    }
}

/// Run the eval command.
pub fn run(args: EvalArgs, ctx: &Context) -> Result<()> {
    let config = engine_config(&args, ctx)?;
    let script = ctx.resolve_path(&args.script);
    let method: Method = args
        .method
        .parse()
        .with_context(|| format!("Invalid request method: {}", args.method))?;

    let sink = Arc::new(RecordingSink::new());
    let engine = CacheEngine::new(config).with_sink(sink.clone());

    let mut request = engine
        .request_context(args.uri.as_str())
        .with_script_filename(script.display().to_string());
    if let Some(root) = &args.document_root {
        request = request.with_document_root(root.as_str());
    }
    if let Some(path_info) = &args.path_info {
        request = request.with_path_info(path_info.as_str());
    }

    let mut pipeline = MemoryPipeline::new(request.script_name.as_str(), script.display().to_string())
        .with_method(method);
    if let Some(since) = &args.if_modified_since {
        pipeline = pipeline.with_request_header(IF_MODIFIED_SINCE, since);
    }
    if let Some(modified) = &args.last_modified {
        pipeline = pipeline.with_response_header(LAST_MODIFIED, modified);
    }

    ctx.output.debug(&format!(
        "Running {} for {} (request {})",
        script.display(),
        args.uri,
        request.request_id
    ));
    let result = engine.run(&request, &script, &mut pipeline);

    if args.body {
        return write_body(&result.body_chunks);
    }

    let report = EvalReport::new(
        script.display().to_string(),
        args.uri.clone(),
        result,
        &pipeline,
        sink.entries(),
    );
    print_report(&report, ctx);
    Ok(())
}

fn engine_config(args: &EvalArgs, ctx: &Context) -> Result<EngineConfig> {
    let mut config = ctx.engine_config()?.unwrap_or_default();

    if let Some(dir) = &args.cache_dir {
        config.cache_base_dir = dir.clone();
    }
    if let Some(url) = &args.base_url {
        config.cache_base_url = url.clone();
    }
    if config.cache_base_dir.is_empty() {
        bail!("No cache directory configured. Pass --cache-dir or run `cml config init`.");
    }

    config.validate()?;
    Ok(config)
}

fn write_body(chunks: &[BodyChunk]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for chunk in chunks {
        let mut file = File::open(&chunk.path)
            .with_context(|| format!("Failed to open {}", chunk.path.display()))?;
        if chunk.offset > 0 {
            std::io::copy(&mut (&mut file).take(chunk.offset), &mut std::io::sink())?;
        }
        std::io::copy(&mut file.take(chunk.length), &mut out)
            .with_context(|| format!("Failed to read {}", chunk.path.display()))?;
    }

    out.flush()?;
    Ok(())
}

fn print_report(report: &EvalReport, ctx: &Context) {
    if ctx.output.is_json() {
        ctx.output.json(report);
        return;
    }

    ctx.output.header(&format!("{} {}", report.script, report.request_uri));
    ctx.output.kv("decision", &decision_badge(report.decision));
    ctx.output.kv("outcome", report.outcome);

    let mtime = DateTime::<Utc>::from_timestamp(report.aggregated_mtime, 0)
        .filter(|_| report.aggregated_mtime > 0)
        .map(|dt| format!("{} ({})", report.aggregated_mtime, dt.to_rfc3339()))
        .unwrap_or_else(|| report.aggregated_mtime.to_string());
    ctx.output.kv("aggregated mtime", &mtime);

    if let Some(last_modified) = &report.last_modified {
        ctx.output.kv("last-modified", last_modified);
    }
    if let Some(content_type) = &report.content_type {
        ctx.output.kv("content-type", content_type);
    }
    if let Some(target) = &report.target {
        ctx.output.kv("logical path", &target.logical_path);
        ctx.output.kv("physical path", &target.physical_path);
    }
    if let (Some(kind), Some(error)) = (report.error_kind, &report.error) {
        ctx.output.kv("failure", &format!("{kind}: {error}"));
    }

    if !report.body_chunks.is_empty() {
        ctx.output.info(&format!(
            "Body: {} file(s), {}",
            report.body_chunks.len(),
            format_bytes(report.body_length)
        ));
        for chunk in &report.body_chunks {
            ctx.output.list_item(&format!(
                "{} ({})",
                chunk.path.display(),
                format_bytes(chunk.length)
            ));
        }
    }

    if !report.diagnostics.is_empty() {
        ctx.output.info("Diagnostics:");
        for diagnostic in &report.diagnostics {
            ctx.output.list_item(&diagnostic.to_human());
        }
    }

    match report.decision {
        Decision::Hit => ctx.output.success("Served from cache"),
        Decision::Miss => ctx.output.warn("Cache miss, request re-targeted at the trigger handler"),
        Decision::Error => ctx.output.warn("Pass ended with an error"),
    }
}
