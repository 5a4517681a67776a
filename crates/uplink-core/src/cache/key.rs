use std::collections::BTreeMap;
use uplink_types::HttpMethod;

/// Normalize a request path: leading slash, no trailing slash, no blanks.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}

/// Cache key for a request: method, normalized path, and params in key order.
///
/// `/users/` with `{b: 2, a: 1}` and `/users` with `{a: 1, b: 2}` map to
/// the same key.
pub fn cache_key(method: HttpMethod, path: &str, params: &BTreeMap<String, String>) -> String {
    let mut key = format!("{} {}", method.as_str(), normalize_path(path));
    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        key.push('?');
        key.push_str(&query);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_param_order_irrelevant() {
        let a = cache_key(HttpMethod::Get, "/users", &params(&[("page", "2"), ("limit", "10")]));
        let b = cache_key(HttpMethod::Get, "/users/", &params(&[("limit", "10"), ("page", "2")]));
        assert_eq!(a, b);
        assert_eq!(a, "GET /users?limit=10&page=2");
    }

    #[test]
    fn test_method_distinguishes() {
        let empty = BTreeMap::new();
        assert_ne!(
            cache_key(HttpMethod::Get, "/users", &empty),
            cache_key(HttpMethod::Head, "/users", &empty)
        );
    }

    #[test]
    fn test_values_are_escaped() {
        let key = cache_key(HttpMethod::Get, "search", &params(&[("q", "a&b=c")]));
        assert_eq!(key, "GET /search?q=a%26b%3Dc");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("users/42/"), "/users/42");
    }
}
