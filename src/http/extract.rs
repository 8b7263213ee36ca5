//! Best-effort origin and identity extraction.

use axum::http::HeaderMap;

/// Sentinel origin for traffic with no derivable client address.
///
/// All unattributable requests pool into this one shared bucket.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Proxy headers consulted for the client address, in precedence order.
const ORIGIN_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Body fields that may carry a claimed identity, in precedence order.
const IDENTITY_FIELDS: [&str; 3] = ["email", "username", "login"];

/// Derive the client network address from proxy headers.
///
/// `x-forwarded-for` may carry a comma-separated chain; the first entry
/// is the client. Never fails; falls back to [`UNKNOWN_ORIGIN`].
pub fn client_origin(headers: &HeaderMap) -> String {
    for name in ORIGIN_HEADERS {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let candidate = value.split(',').next().unwrap_or(value).trim();
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }
    UNKNOWN_ORIGIN.to_string()
}

/// Read a claimed identity out of a buffered JSON body.
///
/// Tries the well-known fields in order and accepts only string values.
/// The result is trimmed and lower-cased so case and whitespace variants
/// of one identity land in one bucket. Anything malformed yields `None`.
pub fn claimed_identity(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    for field in IDENTITY_FIELDS {
        if let Some(raw) = value.get(field).and_then(|v| v.as_str()) {
            let normalized = raw.trim().to_lowercase();
            if !normalized.is_empty() {
                return Some(normalized);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn build_headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let headers = build_headers(&[("x-forwarded-for", "1.2.3.4, 10.0.0.1, 10.0.0.2")]);
        assert_eq!(client_origin(&headers), "1.2.3.4");
    }

    #[test]
    fn test_header_precedence_order() {
        let headers = build_headers(&[
            ("cf-connecting-ip", "3.3.3.3"),
            ("x-real-ip", "2.2.2.2"),
            ("x-forwarded-for", "1.1.1.1"),
        ]);
        assert_eq!(client_origin(&headers), "1.1.1.1");

        let headers = build_headers(&[("cf-connecting-ip", "3.3.3.3"), ("x-real-ip", "2.2.2.2")]);
        assert_eq!(client_origin(&headers), "2.2.2.2");

        let headers = build_headers(&[("cf-connecting-ip", "3.3.3.3")]);
        assert_eq!(client_origin(&headers), "3.3.3.3");
    }

    #[test]
    fn test_missing_headers_yield_unknown() {
        assert_eq!(client_origin(&HeaderMap::new()), UNKNOWN_ORIGIN);
    }

    #[test]
    fn test_blank_forwarded_for_falls_through() {
        let headers = build_headers(&[("x-forwarded-for", "  "), ("x-real-ip", "2.2.2.2")]);
        assert_eq!(client_origin(&headers), "2.2.2.2");
    }

    #[test]
    fn test_identity_normalization_collapses_variants() {
        let variants = [
            r#"{"email":"Foo@Bar.com"}"#,
            r#"{"email":" foo@bar.com "}"#,
            r#"{"email":"foo@bar.com"}"#,
        ];
        for body in variants {
            assert_eq!(
                claimed_identity(body.as_bytes()).as_deref(),
                Some("foo@bar.com")
            );
        }
    }

    #[test]
    fn test_identity_field_precedence() {
        let body = r#"{"username":"alice","email":"a@x.com"}"#;
        assert_eq!(claimed_identity(body.as_bytes()).as_deref(), Some("a@x.com"));

        let body = r#"{"login":"bob","username":"alice"}"#;
        assert_eq!(claimed_identity(body.as_bytes()).as_deref(), Some("alice"));

        let body = r#"{"login":"bob"}"#;
        assert_eq!(claimed_identity(body.as_bytes()).as_deref(), Some("bob"));
    }

    #[test]
    fn test_non_string_identity_rejected() {
        assert_eq!(claimed_identity(br#"{"email":42}"#), None);
        assert_eq!(claimed_identity(br#"{"email":["a@x.com"]}"#), None);
        assert_eq!(claimed_identity(br#"{"email":null}"#), None);
    }

    #[test]
    fn test_malformed_bodies_yield_none() {
        assert_eq!(claimed_identity(b"not json"), None);
        assert_eq!(claimed_identity(b""), None);
        assert_eq!(claimed_identity(br#"["email"]"#), None);
        assert_eq!(claimed_identity(br#"{"password":"secret"}"#), None);
    }

    #[test]
    fn test_whitespace_only_identity_rejected() {
        assert_eq!(claimed_identity(br#"{"email":"   "}"#), None);
    }
}
