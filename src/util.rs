/// Service path prefix under the configured base URL.
pub(crate) const API_PREFIX: &str = "/bdds/bdds-bff-service/prod/api";

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Resource API root for a base URL such as `https://publication-bdds.apps.epo.org`.
pub(crate) fn api_root(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(API_PREFIX) {
        return base.to_string();
    }
    urljoin(base, API_PREFIX)
}

pub(crate) fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Treats blank values as absent.
pub(crate) fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}
