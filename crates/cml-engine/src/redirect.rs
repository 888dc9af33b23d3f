//! Internal re-dispatch to the regeneration handler.

use cml_core::{CacheMissTarget, ServingPipeline};

/// Re-targets a request at the trigger handler.
///
/// This is an internal rewrite; the client never sees a redirect.
#[derive(Debug, Clone, Copy)]
pub struct MissRedirector<'a> {
    cache_base_url: &'a str,
    cache_base_dir: &'a str,
}

impl<'a> MissRedirector<'a> {
    /// Create a redirector for a cache base URL and directory.
    pub fn new(cache_base_url: &'a str, cache_base_dir: &'a str) -> Self {
        Self {
            cache_base_url,
            cache_base_dir,
        }
    }

    /// Rewrite both request paths and drop any composed body.
    pub fn redirect(&self, pipeline: &mut dyn ServingPipeline, handler: &str) -> CacheMissTarget {
        let target = CacheMissTarget::new(self.cache_base_url, self.cache_base_dir, handler);
        pipeline.reset_body();
        pipeline.rewrite_target(&target);
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cml_core::{BodyChunk, MemoryPipeline, ResponseState};

    #[test]
    fn test_redirect_rewrites_both_paths() {
        let mut pipeline = MemoryPipeline::new("/news/", "/srv/www/news/");
        pipeline.append_body_chunk(BodyChunk::whole_file("/srv/cache/a.html", 3));

        let target = MissRedirector::new("/cache/", "/srv/cache/").redirect(&mut pipeline, "gen.php");

        assert_eq!(target.logical_path, "/cache/gen.php");
        assert_eq!(target.physical_path, "/srv/cache/gen.php");
        assert_eq!(pipeline.logical_path, "/cache/gen.php");
        assert_eq!(pipeline.physical_path, "/srv/cache/gen.php");
        assert!(pipeline.body.is_empty());
        assert_eq!(pipeline.state, ResponseState::Pending);
    }
}
