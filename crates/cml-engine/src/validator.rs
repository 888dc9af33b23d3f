//! Freshness validation of the backing files a HIT depends on.

use cml_core::{BackingFile, BodyChunk, EngineError};

use crate::store::BackingStore;

/// How validation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Every listed file exists.
    Fresh,
    /// A file is missing and a handler can regenerate it.
    Stale {
        /// Absolute path of the first missing file.
        missing: String,
    },
    /// Validation failed; the pass ends with ERROR.
    Failed(EngineError),
}

/// Result of validating an include list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// How validation ended.
    pub freshness: Freshness,
    /// Files that were stat'ed and found, in include order.
    pub validated: Vec<BackingFile>,
    /// Newest mtime over `validated`, or 0.
    pub aggregated_mtime: i64,
}

impl ValidationReport {
    /// Body segments for the validated files, in include order.
    pub fn body_chunks(&self) -> Vec<BodyChunk> {
        self.validated.iter().map(BackingFile::chunk).collect()
    }
}

/// Walks an include list against a backing store.
pub struct FreshnessValidator<'a> {
    store: &'a dyn BackingStore,
    cache_base_dir: &'a str,
}

impl<'a> FreshnessValidator<'a> {
    /// Create a validator resolving paths against `cache_base_dir`.
    pub fn new(store: &'a dyn BackingStore, cache_base_dir: &'a str) -> Self {
        Self {
            store,
            cache_base_dir,
        }
    }

    /// Validate the include list in order.
    ///
    /// Stops at the first file that is missing or cannot be stat'ed; later
    /// entries are never queried.
    pub fn validate(&self, include_list: &[String], handler: Option<&str>) -> ValidationReport {
        let mut validated = Vec::with_capacity(include_list.len());
        let mut aggregated_mtime = 0;

        for relative in include_list {
            let file = BackingFile::resolve(self.cache_base_dir, relative.as_str());

            let stat = match self.store.stat(&file.absolute_path) {
                Ok(stat) => stat,
                Err(err) => {
                    let freshness = Freshness::Failed(EngineError::BackingFileStat {
                        path: file.absolute_path,
                        message: err.to_string(),
                    });
                    return ValidationReport {
                        freshness,
                        validated,
                        aggregated_mtime,
                    };
                }
            };

            let Some(stat) = stat else {
                let freshness = match handler {
                    Some(_) => Freshness::Stale {
                        missing: file.absolute_path,
                    },
                    None => Freshness::Failed(EngineError::BackingFileMissingNoHandler {
                        path: file.absolute_path,
                    }),
                };
                return ValidationReport {
                    freshness,
                    validated,
                    aggregated_mtime,
                };
            };

            aggregated_mtime = aggregated_mtime.max(stat.mtime);
            validated.push(file.found(stat.mtime, stat.size));
        }

        ValidationReport {
            freshness: Freshness::Fresh,
            validated,
            aggregated_mtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordingStore;
    use cml_core::FailureKind;
    use std::io;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_present() {
        let store = RecordingStore::new()
            .with_file("/c/a.html", 100, 3)
            .with_file("/c/b.html", 250, 7);
        let report = FreshnessValidator::new(&store, "/c/").validate(&list(&["a.html", "b.html"]), None);

        assert_eq!(report.freshness, Freshness::Fresh);
        assert_eq!(report.aggregated_mtime, 250);
        assert_eq!(
            report.body_chunks(),
            vec![
                BodyChunk::whole_file("/c/a.html", 3),
                BodyChunk::whole_file("/c/b.html", 7)
            ]
        );
    }

    #[test]
    fn test_missing_with_handler_stops_early() {
        let store = RecordingStore::new().with_file("/c/x.html", 100, 3);
        let report = FreshnessValidator::new(&store, "/c/")
            .validate(&list(&["missing.html", "x.html"]), Some("gen.rhai"));

        assert_eq!(
            report.freshness,
            Freshness::Stale {
                missing: "/c/missing.html".to_string()
            }
        );
        assert!(!store.was_queried("/c/x.html"));
        assert_eq!(report.aggregated_mtime, 0);
    }

    #[test]
    fn test_missing_without_handler_fails() {
        let store = RecordingStore::new().with_file("/c/a.html", 100, 3);
        let report = FreshnessValidator::new(&store, "/c/")
            .validate(&list(&["a.html", "gone.html", "b.html"]), None);

        match report.freshness {
            Freshness::Failed(err) => {
                assert_eq!(err.kind(), FailureKind::BackingFileMissingNoHandler);
                assert_eq!(err.subject(), "/c/gone.html");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.validated.len(), 1);
        assert_eq!(report.aggregated_mtime, 100);
        assert_eq!(store.queried(), vec!["/c/a.html", "/c/gone.html"]);
    }

    #[test]
    fn test_stat_error_fails() {
        let store = RecordingStore::new()
            .with_failure("/c/locked.html", io::ErrorKind::PermissionDenied);
        let report = FreshnessValidator::new(&store, "/c/")
            .validate(&list(&["locked.html"]), Some("gen.rhai"));

        assert!(matches!(
            report.freshness,
            Freshness::Failed(EngineError::BackingFileStat { .. })
        ));
    }

    #[test]
    fn test_empty_list_is_fresh() {
        let store = RecordingStore::new();
        let report = FreshnessValidator::new(&store, "/c/").validate(&[], None);
        assert_eq!(report.freshness, Freshness::Fresh);
        assert_eq!(report.aggregated_mtime, 0);
        assert!(store.queried().is_empty());
    }
}
