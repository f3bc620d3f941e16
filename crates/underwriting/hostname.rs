use url::Url;

/// Host part of a listing link. Bare domains are treated as https.
pub fn safe_hostname(maybe_url: Option<&str>) -> Option<String> {
    let raw = maybe_url?.trim();
    if raw.is_empty() {
        return None;
    }

    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    Url::parse(&with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host_with_or_without_scheme() {
        assert_eq!(
            safe_hostname(Some("https://www.bizbuysell.com/listing/123")),
            Some("www.bizbuysell.com".to_string())
        );
        assert_eq!(
            safe_hostname(Some("  bizquest.com/abc ")),
            Some("bizquest.com".to_string())
        );
    }

    #[test]
    fn rejects_blank_and_garbage() {
        assert_eq!(safe_hostname(None), None);
        assert_eq!(safe_hostname(Some("   ")), None);
        assert_eq!(safe_hostname(Some("http://")), None);
    }
}
