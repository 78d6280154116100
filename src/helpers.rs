use chrono::{DateTime, Utc};
use url::{Url, form_urlencoded};

pub(crate) const MAX_RETURN_URL_LEN: usize = 2048;

/// Value of `name` in a `Cookie` header (`a=1; b=2`). First match wins.
pub(crate) fn cookie_value<'a>(cookie_header: Option<&'a str>, name: &str) -> Option<&'a str> {
    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Decoded query parameter from a request target or absolute URL.
pub(crate) fn query_param(target: &str, key: &str) -> Option<String> {
    let without_fragment = target.split('#').next().unwrap_or_default();
    let (_, query) = without_fragment.split_once('?')?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Post-login destination for a request target: path and query only.
pub(crate) fn derive_return_url(request_target: &str) -> String {
    let target = request_target.split('#').next().unwrap_or_default();
    match Url::parse(target) {
        Ok(absolute) => {
            let local = match absolute.query() {
                Some(query) => format!("{}?{query}", absolute.path()),
                None => absolute.path().to_string(),
            };
            validate_return_url(&local)
        }
        Err(_) => validate_return_url(target),
    }
}

/// Accepts only a same-origin absolute path; every other input becomes `/`.
///
/// Browsers strip tab and newline from URLs before resolving them, so
/// `/\t/host` would turn into the network-path reference `//host`. Control
/// characters and whitespace are refused outright.
pub(crate) fn validate_return_url(input: &str) -> String {
    let candidate = input.split('#').next().unwrap_or_default().trim();

    let local_path = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && candidate.len() <= MAX_RETURN_URL_LEN
        && !candidate.contains("://")
        && !candidate
            .chars()
            .any(|c| c == '\\' || c.is_ascii_control() || c.is_whitespace());

    if local_path {
        candidate.to_string()
    } else {
        "/".to_string()
    }
}

/// IMF-fixdate as used by the cookie `Expires` attribute.
pub(crate) fn http_date(unix_secs: u64) -> String {
    let secs = i64::try_from(unix_secs).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub(crate) fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_return_url_keeps_path_and_query() {
        assert_eq!(derive_return_url("/protected?a=1#frag"), "/protected?a=1");
        assert_eq!(derive_return_url("https://example.test/p?q=1#x"), "/p?q=1");
        assert_eq!(derive_return_url("https://example.test"), "/");
        assert_eq!(derive_return_url("/pageA"), "/pageA");
    }

    #[test]
    fn offsite_and_malformed_return_urls_collapse_to_root() {
        for input in [
            "",
            "pageA",
            "http://evil.test",
            "//evil",
            "/\\evil",
            "/\t/evil",
            "/\n/evil",
            "/\r/evil",
            "/ /evil",
            "/\u{0}/evil",
            "/x?next=https://evil.test",
        ] {
            assert_eq!(validate_return_url(input), "/", "{input:?} was accepted");
        }

        let huge = format!("/{}", "a".repeat(MAX_RETURN_URL_LEN));
        assert_eq!(validate_return_url(&huge), "/");
        assert_eq!(validate_return_url("/groups?name=a%20b"), "/groups?name=a%20b");
    }

    #[test]
    fn cookie_value_picks_named_pair() {
        let header = Some("theme=dark; auth_cookie=abc.def.ghi ; other=1");
        assert_eq!(cookie_value(header, "auth_cookie"), Some("abc.def.ghi"));
        assert_eq!(cookie_value(header, "missing"), None);
        assert_eq!(cookie_value(Some("flag; auth_cookie=v"), "auth_cookie"), Some("v"));
        assert_eq!(cookie_value(None, "auth_cookie"), None);
    }

    #[test]
    fn query_param_reads_targets_and_urls() {
        assert_eq!(
            query_param("/cb?code=xyz&state=a%2Bb", "state").as_deref(),
            Some("a+b")
        );
        assert_eq!(
            query_param("https://idp.test/authorize?state=s1#frag", "state").as_deref(),
            Some("s1")
        );
        assert_eq!(query_param("/cb?code=xyz", "state"), None);
        assert_eq!(query_param("/cb", "code"), None);
    }

    #[test]
    fn http_date_is_imf_fixdate() {
        assert_eq!(http_date(0), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(http_date(1_700_000_000), "Tue, 14 Nov 2023 22:13:20 GMT");
    }
}
