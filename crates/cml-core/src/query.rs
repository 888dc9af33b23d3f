//! GET parameter extraction from the raw query string.

use std::collections::HashMap;

/// Parsed GET parameters exposed to the policy script.
pub type GetParameters = HashMap<String, String>;

/// Split a raw query string into GET parameters.
///
/// The scan walks the bytes left to right with an implicit terminator at the
/// end. A pair is only emitted once an `=` has been seen since the last
/// separator, so a bare key such as the `c` in `a=1&b=2&c` is dropped. Later
/// duplicates overwrite earlier ones. Nothing is percent-decoded.
pub fn parse_query_string(query: &str) -> GetParameters {
    let bytes = query.as_bytes();
    let mut params = GetParameters::new();

    let mut awaiting_value = true;
    let mut key_start = 0;
    let mut key_end = 0;
    let mut value_start = 0;

    // One extra iteration for the terminator.
    for i in 0..=bytes.len() {
        match bytes.get(i).copied().unwrap_or(b'\0') {
            b'=' => {
                if awaiting_value {
                    key_end = i;
                    value_start = i + 1;
                    awaiting_value = false;
                }
            }
            b'&' | b'\0' => {
                if !awaiting_value {
                    params.insert(
                        query[key_start..key_end].to_string(),
                        query[value_start..i].to_string(),
                    );
                }
                key_start = i + 1;
                awaiting_value = true;
            }
            _ => {}
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_trailing_key_without_value() {
        let params = parse_query_string("a=1&b=2&c");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a").map(String::as_str), Some("1"));
        assert_eq!(params.get("b").map(String::as_str), Some("2"));
        assert!(!params.contains_key("c"));
    }

    #[test]
    fn test_later_duplicate_wins() {
        let params = parse_query_string("a=1&a=2");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("a").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_empty_query() {
        assert!(parse_query_string("").is_empty());
        assert!(parse_query_string("&&&").is_empty());
    }

    #[test]
    fn test_bare_key_before_pair_is_dropped() {
        let params = parse_query_string("flag&id=7");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_only_first_equals_splits() {
        let params = parse_query_string("expr=a=b");
        assert_eq!(params.get("expr").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_empty_key_and_empty_value_are_kept() {
        let params = parse_query_string("=v&k=");
        assert_eq!(params.get("").map(String::as_str), Some("v"));
        assert_eq!(params.get("k").map(String::as_str), Some(""));
    }

    #[test]
    fn test_values_are_not_decoded() {
        let params = parse_query_string("q=hello%20world+x");
        assert_eq!(params.get("q").map(String::as_str), Some("hello%20world+x"));
    }
}
