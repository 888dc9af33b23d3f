//! Conditional-response resolution for validated hits.

use cml_core::{BodyChunk, ConditionalEvaluator, Outcome, ResponseState, ServingPipeline};
use http::header::{CONTENT_TYPE, LAST_MODIFIED};

use crate::http_date::format_http_date;

/// How a hit was finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Effective Last-Modified value. An existing header that is not valid
    /// UTF-8 is reported lossily and left as is in the pipeline.
    pub last_modified: Option<String>,
    /// Body handed to the pipeline. Empty for not-modified.
    pub body_chunks: Vec<BodyChunk>,
    /// `Composed` or `NotModified`.
    pub outcome: Outcome,
}

/// Finishes a hit as a composed or not-modified response.
pub struct ConditionalResolver<'a> {
    evaluator: &'a dyn ConditionalEvaluator,
}

impl<'a> ConditionalResolver<'a> {
    /// Create a resolver using `evaluator` for conditional requests.
    pub fn new(evaluator: &'a dyn ConditionalEvaluator) -> Self {
        Self { evaluator }
    }

    /// Settle Last-Modified, run the conditional check and finish the response.
    ///
    /// A Last-Modified header set by an earlier stage wins over the
    /// aggregated mtime. An mtime of 0 sets no header.
    pub fn resolve(
        &self,
        pipeline: &mut dyn ServingPipeline,
        body_chunks: Vec<BodyChunk>,
        aggregated_mtime: i64,
        content_type: Option<&str>,
    ) -> Resolution {
        let last_modified = match pipeline.response_header(&LAST_MODIFIED) {
            Some(existing) => Some(String::from_utf8_lossy(existing.as_bytes()).into_owned()),
            None if aggregated_mtime > 0 => {
                let formatted = format_http_date(aggregated_mtime);
                if let Some(value) = &formatted {
                    pipeline.overwrite_response_header(LAST_MODIFIED, value);
                }
                formatted
            }
            None => None,
        };

        if let Some(content_type) = content_type {
            pipeline.overwrite_response_header(CONTENT_TYPE, content_type);
        }

        let conditional = pipeline.conditional_headers();
        if self
            .evaluator
            .client_copy_is_current(last_modified.as_deref(), &conditional)
        {
            pipeline.reset_body();
            pipeline.finish(ResponseState::NotModified);
            return Resolution {
                last_modified,
                body_chunks: Vec::new(),
                outcome: Outcome::NotModified,
            };
        }

        pipeline.reset_body();
        for chunk in &body_chunks {
            pipeline.append_body_chunk(chunk.clone());
        }
        pipeline.finish(ResponseState::Complete);

        Resolution {
            last_modified,
            body_chunks,
            outcome: Outcome::Composed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditional::HttpConditional;
    use cml_core::MemoryPipeline;
    use http::header::{HeaderValue, IF_MODIFIED_SINCE};

    fn chunks() -> Vec<BodyChunk> {
        vec![BodyChunk::whole_file("/c/a.html", 3)]
    }

    #[test]
    fn test_sets_last_modified_from_mtime() {
        let mut pipeline = MemoryPipeline::new("/a", "/srv/a");
        let resolution = ConditionalResolver::new(&HttpConditional).resolve(
            &mut pipeline,
            chunks(),
            1_122_153_601,
            Some("text/html"),
        );

        assert_eq!(resolution.outcome, Outcome::Composed);
        assert_eq!(
            pipeline.response_header_str(&LAST_MODIFIED),
            Some("Sat, 23 Jul 2005 21:20:01 GMT")
        );
        assert_eq!(pipeline.response_header_str(&CONTENT_TYPE), Some("text/html"));
        assert_eq!(pipeline.body, chunks());
        assert_eq!(pipeline.state, ResponseState::Complete);
    }

    #[test]
    fn test_existing_last_modified_wins() {
        let mut pipeline = MemoryPipeline::new("/a", "/srv/a")
            .with_response_header(LAST_MODIFIED, "Mon, 01 Jan 2001 00:00:00 GMT");
        let resolution =
            ConditionalResolver::new(&HttpConditional).resolve(&mut pipeline, chunks(), 1_122_153_601, None);

        assert_eq!(
            resolution.last_modified.as_deref(),
            Some("Mon, 01 Jan 2001 00:00:00 GMT")
        );
        assert_eq!(
            pipeline.response_header_str(&LAST_MODIFIED),
            Some("Mon, 01 Jan 2001 00:00:00 GMT")
        );
    }

    #[test]
    fn test_opaque_last_modified_is_kept_verbatim() {
        let opaque = HeaderValue::from_bytes(b"Mon, 01 Jan 2001 \xe9").unwrap();
        let mut pipeline = MemoryPipeline::new("/a", "/srv/a");
        pipeline.response_headers.insert(LAST_MODIFIED, opaque.clone());

        let resolution =
            ConditionalResolver::new(&HttpConditional).resolve(&mut pipeline, chunks(), 1_122_153_601, None);

        assert_eq!(pipeline.response_header(&LAST_MODIFIED), Some(opaque));
        assert_eq!(
            resolution.last_modified.as_deref(),
            Some("Mon, 01 Jan 2001 \u{fffd}")
        );
        assert_eq!(resolution.outcome, Outcome::Composed);
    }

    #[test]
    fn test_zero_mtime_sets_no_header() {
        let mut pipeline = MemoryPipeline::new("/a", "/srv/a");
        let resolution =
            ConditionalResolver::new(&HttpConditional).resolve(&mut pipeline, Vec::new(), 0, None);

        assert_eq!(resolution.last_modified, None);
        assert!(pipeline.response_header(&LAST_MODIFIED).is_none());
        assert_eq!(resolution.outcome, Outcome::Composed);
    }

    #[test]
    fn test_not_modified_discards_body() {
        let mut pipeline = MemoryPipeline::new("/a", "/srv/a")
            .with_request_header(IF_MODIFIED_SINCE, "Sat, 23 Jul 2005 21:20:01 GMT");
        let resolution =
            ConditionalResolver::new(&HttpConditional).resolve(&mut pipeline, chunks(), 1_122_153_601, None);

        assert_eq!(resolution.outcome, Outcome::NotModified);
        assert!(resolution.body_chunks.is_empty());
        assert!(pipeline.body.is_empty());
        assert_eq!(pipeline.state, ResponseState::NotModified);
    }
}
