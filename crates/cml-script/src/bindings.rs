//! The namespace a policy script runs against.

use std::collections::BTreeMap;

use cml_core::{Decision, GetParameters, RequestContext};
use rhai::{Dynamic, Map, Scope, INT};

/// Names visible to policy scripts.
pub mod names {
    /// Constant for a cache hit.
    pub const CACHE_HIT: &str = "CACHE_HIT";
    /// Constant for a cache miss.
    pub const CACHE_MISS: &str = "CACHE_MISS";
    /// Request facts table.
    pub const REQUEST: &str = "request";
    /// GET parameters table.
    pub const GET_PARAMS: &str = "get_params";
    /// Output: regeneration handler, relative to the cache base.
    pub const TRIGGER_HANDLER: &str = "trigger_handler";
    /// Output: response content type.
    pub const OUTPUT_CONTENT_TYPE: &str = "output_content_type";
    /// Output: backing files, relative to the cache base.
    pub const OUTPUT_INCLUDE: &str = "output_include";

    /// Keys of the request facts table.
    pub mod request {
        pub const REQUEST_URI: &str = "REQUEST_URI";
        pub const SCRIPT_NAME: &str = "SCRIPT_NAME";
        pub const SCRIPT_FILENAME: &str = "SCRIPT_FILENAME";
        pub const DOCUMENT_ROOT: &str = "DOCUMENT_ROOT";
        pub const PATH_INFO: &str = "PATH_INFO";
        pub const CWD: &str = "CWD";
        pub const BASEURL: &str = "BASEURL";
    }
}

/// Read-only inputs of a policy script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEnvironment {
    /// Request facts keyed by their script-visible names.
    pub request: BTreeMap<String, String>,
    /// Parsed GET parameters.
    pub get_params: GetParameters,
}

impl ScriptEnvironment {
    /// Collect the script inputs for a request.
    ///
    /// `PATH_INFO` is left out entirely when the request has none.
    pub fn bind(ctx: &RequestContext) -> Self {
        use names::request::*;

        let mut request = BTreeMap::new();
        request.insert(REQUEST_URI.to_string(), ctx.request_uri.clone());
        request.insert(SCRIPT_NAME.to_string(), ctx.script_name.clone());
        request.insert(SCRIPT_FILENAME.to_string(), ctx.script_filename.clone());
        request.insert(DOCUMENT_ROOT.to_string(), ctx.document_root.clone());
        if let Some(path_info) = ctx.path_info.as_ref().filter(|p| !p.is_empty()) {
            request.insert(PATH_INFO.to_string(), path_info.clone());
        }
        request.insert(CWD.to_string(), ctx.cache_base_dir.clone());
        request.insert(BASEURL.to_string(), ctx.cache_base_url.clone());

        Self {
            request,
            get_params: ctx.get_parameters.clone(),
        }
    }

    /// Push the inputs and the unset outputs into a fresh scope.
    pub fn install(&self, scope: &mut Scope<'_>) {
        scope.push_constant(names::CACHE_HIT, Decision::HIT_VALUE as INT);
        scope.push_constant(names::CACHE_MISS, Decision::MISS_VALUE as INT);
        scope.push_constant(names::REQUEST, to_map(self.request.iter()));
        scope.push_constant(names::GET_PARAMS, to_map(self.get_params.iter()));

        // Outputs start as unit so scripts can assign them without `let`.
        scope.push(names::TRIGGER_HANDLER, ());
        scope.push(names::OUTPUT_CONTENT_TYPE, ());
        scope.push(names::OUTPUT_INCLUDE, ());
    }
}

fn to_map<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> Map {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key.as_str().into(), Dynamic::from(value.clone()));
    }
    map
}
