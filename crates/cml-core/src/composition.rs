//! Composition data produced by a pass.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::error::EngineError;

/// Resolve a path by plain concatenation of a base and a relative part.
///
/// No separator is inserted and no traversal is normalized.
pub fn join_base(base: &str, relative: &str) -> String {
    let mut path = String::with_capacity(base.len() + relative.len());
    path.push_str(base);
    path.push_str(relative);
    path
}

/// A backing file consulted during freshness validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingFile {
    /// Path as declared by the script.
    pub relative_path: String,
    /// Cache base directory concatenated with the relative path.
    pub absolute_path: String,
    /// Whether the file existed at stat time.
    pub exists: bool,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: i64,
    /// Size in bytes.
    pub size: u64,
}

impl BackingFile {
    /// Resolve a script-declared path against the cache base directory.
    pub fn resolve(cache_base_dir: &str, relative_path: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        Self {
            absolute_path: join_base(cache_base_dir, &relative_path),
            relative_path,
            exists: false,
            mtime: 0,
            size: 0,
        }
    }

    /// Record the stat result of an existing file.
    pub fn found(mut self, mtime: i64, size: u64) -> Self {
        self.exists = true;
        self.mtime = mtime;
        self.size = size;
        self
    }

    /// The body segment covering this whole file.
    pub fn chunk(&self) -> BodyChunk {
        BodyChunk::whole_file(&self.absolute_path, self.size)
    }
}

/// A segment of a file to send as part of the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyChunk {
    /// Absolute file path.
    pub path: PathBuf,
    /// Offset into the file.
    pub offset: u64,
    /// Number of bytes to send.
    pub length: u64,
}

impl BodyChunk {
    /// A segment covering a whole file.
    pub fn whole_file(path: impl Into<PathBuf>, length: u64) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            length,
        }
    }
}

/// Where a cache miss is re-dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMissTarget {
    /// New logical path: cache base URL ++ handler.
    pub logical_path: String,
    /// New physical path: cache base directory ++ handler.
    pub physical_path: String,
}

impl CacheMissTarget {
    /// Build the target for a trigger handler.
    pub fn new(cache_base_url: &str, cache_base_dir: &str, handler: &str) -> Self {
        Self {
            logical_path: join_base(cache_base_url, handler),
            physical_path: join_base(cache_base_dir, handler),
        }
    }
}

/// What the engine did to the pipeline at the end of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The composed body chunks were handed to the pipeline.
    Composed,
    /// The client's copy is current; the response has no body.
    NotModified,
    /// The request was re-targeted at the regeneration handler.
    Regenerate(CacheMissTarget),
    /// The pass failed; the pipeline handles the error response.
    Failed(EngineError),
}

/// Result of one engine pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionResult {
    /// Final decision after validation.
    pub decision: Decision,
    /// Newest modification time over the files actually validated.
    pub aggregated_mtime: i64,
    /// Body segments in include order. Empty unless the body was composed.
    pub body_chunks: Vec<BodyChunk>,
    /// Effective Last-Modified value, when one was determined.
    pub last_modified: Option<String>,
    /// Outcome applied to the pipeline.
    pub outcome: Outcome,
}

impl CompositionResult {
    /// A failed pass. Composed chunks are never carried on failure.
    pub fn failed(error: EngineError, aggregated_mtime: i64) -> Self {
        Self {
            decision: Decision::Error,
            aggregated_mtime,
            body_chunks: Vec::new(),
            last_modified: None,
            outcome: Outcome::Failed(error),
        }
    }

    /// A pass re-targeted at the regeneration handler.
    pub fn regenerate(target: CacheMissTarget, aggregated_mtime: i64) -> Self {
        Self {
            decision: Decision::Miss,
            aggregated_mtime,
            body_chunks: Vec::new(),
            last_modified: None,
            outcome: Outcome::Regenerate(target),
        }
    }

    /// The error, if the pass failed.
    pub fn error(&self) -> Option<&EngineError> {
        match &self.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// The miss target, if the pass was re-targeted.
    pub fn miss_target(&self) -> Option<&CacheMissTarget> {
        match &self.outcome {
            Outcome::Regenerate(target) => Some(target),
            _ => None,
        }
    }

    /// Total bytes of the composed body.
    pub fn body_length(&self) -> u64 {
        self.body_chunks.iter().map(|c| c.length).sum()
    }
}
