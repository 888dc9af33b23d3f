//! Structured diagnostic events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use cml_core::{EngineError, FailureKind, RequestId};
use serde::Serialize;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A structured diagnostic emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub level: DiagnosticLevel,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    pub request_id: String,
    /// Failure kind, when the diagnostic reports a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Offending script identifier or backing file path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Additional structured fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Microseconds since the pass started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_us: Option<u64>,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(level: DiagnosticLevel, request_id: &RequestId, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            request_id: request_id.to_string(),
            kind: None,
            subject: None,
            fields: BTreeMap::new(),
            elapsed_us: None,
        }
    }

    /// The failure diagnostic for an engine error.
    pub fn failure(request_id: &RequestId, error: &EngineError) -> Self {
        Self::new(DiagnosticLevel::Error, request_id, error.to_string())
            .with_kind(error.kind())
            .with_subject(error.subject())
    }

    /// Set the failure kind.
    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Add a string field.
    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.to_string(), serde_json::json!(value.into()));
        self
    }

    /// Add an integer field.
    pub fn field_i64(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), serde_json::json!(value));
        self
    }

    /// Set the elapsed time.
    pub fn with_elapsed_us(mut self, elapsed_us: u64) -> Self {
        self.elapsed_us = Some(elapsed_us);
        self
    }

    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }

    /// Format as human-readable string.
    pub fn to_human(&self) -> String {
        let mut s = format!("[{}] {}", self.level, self.message);

        if let Some(kind) = self.kind {
            s.push_str(&format!(" kind={}", kind));
        }

        if let Some(elapsed) = self.elapsed_us {
            s.push_str(&format!(" ({}us)", elapsed));
        }

        if !self.fields.is_empty() {
            s.push_str(" | ");
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            s.push_str(&fields.join(" "));
        }

        s
    }
}

/// Destination for engine diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Emit one diagnostic.
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, d: Diagnostic) {
        let kind = d.kind.map(|k| k.as_str()).unwrap_or("");
        let subject = d.subject.as_deref().unwrap_or("");
        let fields = serde_json::Value::Object(d.fields.clone().into_iter().collect());

        match d.level {
            DiagnosticLevel::Debug => tracing::debug!(
                request_id = %d.request_id, kind, subject, fields = %fields, "{}", d.message
            ),
            DiagnosticLevel::Info => tracing::info!(
                request_id = %d.request_id, kind, subject, fields = %fields, "{}", d.message
            ),
            DiagnosticLevel::Warn => tracing::warn!(
                request_id = %d.request_id, kind, subject, fields = %fields, "{}", d.message
            ),
            DiagnosticLevel::Error => tracing::error!(
                request_id = %d.request_id, kind, subject, fields = %fields, "{}", d.message
            ),
        }
    }
}

/// Keeps diagnostics in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostics recorded so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Failure diagnostics recorded so far.
    pub fn failures(&self) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.kind.is_some())
            .collect()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(diagnostic);
        }
    }
}
