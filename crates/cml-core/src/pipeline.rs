//! Serving-pipeline collaborator interfaces.

use http::header::{HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use http::Method;

use crate::composition::{BodyChunk, CacheMissTarget};

/// Conditional request headers handed to the conditional-GET evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    /// Request method.
    pub method: Method,
    /// Raw `If-Modified-Since` value.
    pub if_modified_since: Option<String>,
    /// Raw `If-None-Match` value.
    pub if_none_match: Option<String>,
}

impl ConditionalHeaders {
    /// Extract the conditional headers from a request header map.
    pub fn from_headers(method: Method, headers: &HeaderMap) -> Self {
        let get = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            method,
            if_modified_since: get(&IF_MODIFIED_SINCE),
            if_none_match: get(&IF_NONE_MATCH),
        }
    }

    /// Whether the request carries any conditional header.
    pub fn is_conditional(&self) -> bool {
        self.if_modified_since.is_some() || self.if_none_match.is_some()
    }
}

/// Decides whether the client's cached copy is still current.
pub trait ConditionalEvaluator: Send + Sync {
    /// Returns true when a not-modified response should be sent.
    fn client_copy_is_current(
        &self,
        last_modified: Option<&str>,
        conditional: &ConditionalHeaders,
    ) -> bool;
}

/// How the response was finished by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseState {
    /// The engine has not finished the response.
    #[default]
    Pending,
    /// The body chunks form the complete response.
    Complete,
    /// Bodyless not-modified response.
    NotModified,
}

/// The request/response surface of the serving pipeline.
///
/// The engine only reads and writes through this trait; header storage,
/// the body sink and the re-dispatch mechanism belong to the pipeline.
pub trait ServingPipeline {
    /// Get a response header set by an earlier stage, as stored.
    fn response_header(&self, name: &HeaderName) -> Option<HeaderValue>;

    /// Set a response header, replacing any existing value.
    fn overwrite_response_header(&mut self, name: HeaderName, value: &str);

    /// The request's conditional headers.
    fn conditional_headers(&self) -> ConditionalHeaders;

    /// Append a segment to the response body.
    fn append_body_chunk(&mut self, chunk: BodyChunk);

    /// Drop every body segment appended so far.
    fn reset_body(&mut self);

    /// Re-target the request for an internal re-dispatch.
    fn rewrite_target(&mut self, target: &CacheMissTarget);

    /// Mark the response as finished.
    fn finish(&mut self, state: ResponseState);
}

/// In-memory pipeline for tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryPipeline {
    /// Request method.
    pub method: Method,
    /// Request headers.
    pub request_headers: HeaderMap,
    /// Response headers.
    pub response_headers: HeaderMap,
    /// Response body segments.
    pub body: Vec<BodyChunk>,
    /// Logical request path.
    pub logical_path: String,
    /// Physical request path.
    pub physical_path: String,
    /// Response state.
    pub state: ResponseState,
    /// Number of times the request was re-targeted.
    pub rewrites: usize,
}

impl MemoryPipeline {
    /// Create a pipeline for a GET request.
    pub fn new(logical_path: impl Into<String>, physical_path: impl Into<String>) -> Self {
        Self {
            logical_path: logical_path.into(),
            physical_path: physical_path.into(),
            ..Self::default()
        }
    }

    /// Set the request method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a request header. Invalid values are ignored.
    pub fn with_request_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.request_headers.insert(name, value);
        }
        self
    }

    /// Add a response header, as an earlier stage would. Invalid values are ignored.
    pub fn with_response_header(mut self, name: HeaderName, value: &str) -> Self {
        self.overwrite_response_header(name, value);
        self
    }

    /// A response header as text. `None` when absent or not visible ASCII.
    pub fn response_header_str(&self, name: &HeaderName) -> Option<&str> {
        self.response_headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl ServingPipeline for MemoryPipeline {
    fn response_header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.response_headers.get(name).cloned()
    }

    fn overwrite_response_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.response_headers.insert(name, value);
        }
    }

    fn conditional_headers(&self) -> ConditionalHeaders {
        ConditionalHeaders::from_headers(self.method.clone(), &self.request_headers)
    }

    fn append_body_chunk(&mut self, chunk: BodyChunk) {
        self.body.push(chunk);
    }

    fn reset_body(&mut self) {
        self.body.clear();
    }

    fn rewrite_target(&mut self, target: &CacheMissTarget) {
        self.logical_path = target.logical_path.clone();
        self.physical_path = target.physical_path.clone();
        self.rewrites += 1;
    }

    fn finish(&mut self, state: ResponseState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use http::header::{CONTENT_TYPE, LAST_MODIFIED};

    use super::*;

    #[test]
    fn test_conditional_headers_from_request() {
        let pipeline = MemoryPipeline::new("/a", "/srv/a")
            .with_request_header(IF_MODIFIED_SINCE, "Sat, 23 Jul 2005 21:20:01 GMT");
        let conditional = pipeline.conditional_headers();

        assert_eq!(conditional.method, Method::GET);
        assert_eq!(
            conditional.if_modified_since.as_deref(),
            Some("Sat, 23 Jul 2005 21:20:01 GMT")
        );
        assert!(conditional.if_none_match.is_none());
        assert!(conditional.is_conditional());
    }

    #[test]
    fn test_overwrite_response_header() {
        let mut pipeline =
            MemoryPipeline::new("/a", "/srv/a").with_response_header(CONTENT_TYPE, "text/plain");
        pipeline.overwrite_response_header(CONTENT_TYPE, "text/html");

        assert_eq!(pipeline.response_header_str(&CONTENT_TYPE), Some("text/html"));
        assert_eq!(pipeline.response_headers.get_all(CONTENT_TYPE).iter().count(), 1);
        assert!(pipeline.response_header(&LAST_MODIFIED).is_none());
    }

    #[test]
    fn test_rewrite_and_body() {
        let mut pipeline = MemoryPipeline::new("/a", "/srv/a");
        pipeline.append_body_chunk(BodyChunk::whole_file("/srv/x", 3));
        pipeline.reset_body();
        assert!(pipeline.body.is_empty());

        pipeline.rewrite_target(&CacheMissTarget::new("/cml/", "/srv/cml/", "gen"));
        assert_eq!(pipeline.logical_path, "/cml/gen");
        assert_eq!(pipeline.physical_path, "/srv/cml/gen");
        assert_eq!(pipeline.rewrites, 1);
        assert_eq!(pipeline.state, ResponseState::Pending);
    }
}
