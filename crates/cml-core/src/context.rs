//! Read-only request facts for a single engine pass.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::query::{parse_query_string, GetParameters};

/// Unique request identifier for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}-{:x}", nanos, seq))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request facts handed to the policy script.
///
/// Built once per request by the serving pipeline and never mutated by the
/// engine. The cache base directory and URL come from the engine
/// configuration but travel with the request so a pass is self-contained.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// Original request URI, including the query string.
    pub request_uri: String,
    /// Logical path of the requested resource.
    pub script_name: String,
    /// Physical path the resource was mapped to.
    pub script_filename: String,
    /// Document root of the virtual host.
    pub document_root: String,
    /// Trailing path info, if any.
    pub path_info: Option<String>,
    /// Directory backing files are resolved against.
    pub cache_base_dir: String,
    /// URL prefix of the regeneration handler.
    pub cache_base_url: String,
    /// Raw query string the GET parameters were parsed from.
    pub query_string: String,
    /// Parsed GET parameters.
    pub get_parameters: GetParameters,
}

impl RequestContext {
    /// Create a new request context for a request URI.
    ///
    /// The query string is split off the URI and parsed.
    pub fn new(request_uri: impl Into<String>) -> Self {
        let request_uri = request_uri.into();
        let (path, query) = match request_uri.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (request_uri.clone(), String::new()),
        };

        Self {
            request_id: RequestId::generate(),
            get_parameters: parse_query_string(&query),
            query_string: query,
            script_name: path,
            request_uri,
            script_filename: String::new(),
            document_root: String::new(),
            path_info: None,
            cache_base_dir: String::new(),
            cache_base_url: String::new(),
        }
    }

    /// Set the request ID.
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    /// Set the logical script name.
    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    /// Set the physical script filename.
    pub fn with_script_filename(mut self, filename: impl Into<String>) -> Self {
        self.script_filename = filename.into();
        self
    }

    /// Set the document root.
    pub fn with_document_root(mut self, root: impl Into<String>) -> Self {
        self.document_root = root.into();
        self
    }

    /// Set the path info. An empty value clears it.
    pub fn with_path_info(mut self, path_info: impl Into<String>) -> Self {
        let path_info = path_info.into();
        self.path_info = if path_info.is_empty() {
            None
        } else {
            Some(path_info)
        };
        self
    }

    /// Set the cache base directory and URL.
    pub fn with_cache_base(mut self, dir: impl Into<String>, url: impl Into<String>) -> Self {
        self.cache_base_dir = dir.into();
        self.cache_base_url = url.into();
        self
    }

    /// Replace the query string and re-parse the GET parameters.
    pub fn with_query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = query.into();
        self.get_parameters = parse_query_string(&self.query_string);
        self
    }

    /// Get a GET parameter by name.
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.get_parameters.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_query() {
        let ctx = RequestContext::new("/news/index.html?page=2&lang");
        assert_eq!(ctx.script_name, "/news/index.html");
        assert_eq!(ctx.query_string, "page=2&lang");
        assert_eq!(ctx.get_param("page"), Some("2"));
        assert_eq!(ctx.get_param("lang"), None);
    }

    #[test]
    fn test_new_without_query() {
        let ctx = RequestContext::new("/index.html");
        assert_eq!(ctx.script_name, "/index.html");
        assert!(ctx.query_string.is_empty());
        assert!(ctx.get_parameters.is_empty());
    }

    #[test]
    fn test_empty_path_info_is_absent() {
        let ctx = RequestContext::new("/a").with_path_info("");
        assert!(ctx.path_info.is_none());

        let ctx = ctx.with_path_info("/extra");
        assert_eq!(ctx.path_info.as_deref(), Some("/extra"));
    }

    #[test]
    fn test_with_query_string_reparses() {
        let ctx = RequestContext::new("/a?x=1").with_query_string("y=2");
        assert_eq!(ctx.get_param("x"), None);
        assert_eq!(ctx.get_param("y"), Some("2"));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }
}
