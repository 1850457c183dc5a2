//! URL classification: domain extraction and trackability rules.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Pages that never become timeline entries.
static UNTRACKED_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:chrome://|chrome-extension://|moz-extension://|edge-extension://|about:blank$)",
    )
    .unwrap()
});

/// Schemes and prefixes the browser refuses to capture.
const NON_CAPTURABLE_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "moz-extension://",
    "about:",
    "edge://",
    "opera://",
    "devtools://",
    "view-source:",
    "data:",
    "javascript:",
    "mailto:",
    "tel:",
    "file://",
];

/// Extracts the host name of a URL, lowercased and without port.
///
/// Returns `None` for unparseable URLs and URLs without a host
/// (`about:blank`, `data:` and friends).
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// Returns true if time spent on this URL should be tracked.
pub fn is_trackable_url(url: &str) -> bool {
    !url.is_empty() && !UNTRACKED_URL_RE.is_match(url)
}

/// Returns true if the browser allows capturing a page at this URL.
pub fn is_capturable_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    !NON_CAPTURABLE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host_without_port() {
        assert_eq!(
            extract_domain("https://Docs.Rust-Lang.org:8443/book/ch01.html"),
            Some("docs.rust-lang.org".to_string())
        );
        assert_eq!(
            extract_domain("http://localhost:3000/"),
            Some("localhost".to_string())
        );
    }

    #[test]
    fn hostless_urls_have_no_domain() {
        assert_eq!(extract_domain("about:blank"), None);
        assert_eq!(extract_domain("not a url"), None);
        assert_eq!(extract_domain(""), None);
    }

    #[test]
    fn browser_internal_pages_are_not_tracked() {
        assert!(!is_trackable_url("chrome://newtab/"));
        assert!(!is_trackable_url("chrome-extension://abc/popup.html"));
        assert!(!is_trackable_url("about:blank"));
        assert!(!is_trackable_url(""));
        assert!(is_trackable_url("about:blank#not-quite"));
        assert!(is_trackable_url("https://example.com/"));
    }

    #[test]
    fn capturability_excludes_special_schemes() {
        assert!(is_capturable_url("https://example.com/"));
        assert!(!is_capturable_url("view-source:https://example.com/"));
        assert!(!is_capturable_url("FILE:///etc/hosts"));
        assert!(!is_capturable_url("about:config"));
        assert!(!is_capturable_url(""));
    }
}
