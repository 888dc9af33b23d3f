//! Default conditional-GET evaluation.

use cml_core::{ConditionalEvaluator, ConditionalHeaders};
use http::Method;

use crate::http_date::parse_http_date;

/// `If-Modified-Since` evaluation against the composed Last-Modified.
///
/// Only GET and HEAD are eligible. A request carrying `If-None-Match` is
/// never answered with not-modified, since composed responses have no
/// entity tag to match.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConditional;

impl ConditionalEvaluator for HttpConditional {
    fn client_copy_is_current(
        &self,
        last_modified: Option<&str>,
        conditional: &ConditionalHeaders,
    ) -> bool {
        if conditional.method != Method::GET && conditional.method != Method::HEAD {
            return false;
        }
        if conditional.if_none_match.is_some() {
            return false;
        }

        let (Some(last_modified), Some(since)) =
            (last_modified, conditional.if_modified_since.as_deref())
        else {
            return false;
        };

        if since == last_modified {
            return true;
        }

        match (parse_http_date(since), parse_http_date(last_modified)) {
            (Some(since), Some(modified)) => since >= modified,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LM: &str = "Sat, 23 Jul 2005 21:20:01 GMT";

    fn headers(method: Method, since: Option<&str>) -> ConditionalHeaders {
        ConditionalHeaders {
            method,
            if_modified_since: since.map(str::to_string),
            if_none_match: None,
        }
    }

    #[test]
    fn test_exact_match_is_current() {
        assert!(HttpConditional.client_copy_is_current(Some(LM), &headers(Method::GET, Some(LM))));
    }

    #[test]
    fn test_newer_client_date_is_current() {
        let since = "Sun, 24 Jul 2005 00:00:00 GMT";
        assert!(HttpConditional.client_copy_is_current(Some(LM), &headers(Method::HEAD, Some(since))));

        let older = "Fri, 22 Jul 2005 00:00:00 GMT";
        assert!(!HttpConditional.client_copy_is_current(Some(LM), &headers(Method::GET, Some(older))));
    }

    #[test]
    fn test_ineligible_requests() {
        assert!(!HttpConditional.client_copy_is_current(Some(LM), &headers(Method::POST, Some(LM))));
        assert!(!HttpConditional.client_copy_is_current(None, &headers(Method::GET, Some(LM))));
        assert!(!HttpConditional.client_copy_is_current(Some(LM), &headers(Method::GET, None)));

        let mut with_etag = headers(Method::GET, Some(LM));
        with_etag.if_none_match = Some("\"abc\"".to_string());
        assert!(!HttpConditional.client_copy_is_current(Some(LM), &with_etag));
    }

    #[test]
    fn test_unparseable_dates_only_match_verbatim() {
        assert!(!HttpConditional.client_copy_is_current(Some(LM), &headers(Method::GET, Some("garbage"))));
        assert!(HttpConditional.client_copy_is_current(Some("custom"), &headers(Method::GET, Some("custom"))));
    }
}
