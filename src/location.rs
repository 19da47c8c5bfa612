//! JSON pointer and location helpers.
//!
//! Every error record carries two synchronized locations: a pointer into the
//! synthetic `/request/...` or `/response/...` instance tree and a keyword
//! pointer into the OpenAPI document. This module builds both, and resolves
//! the absolute form of a keyword location (document URI plus encoded
//! fragment) against the request `Host` when the document URI is relative.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

/// Characters percent-encoded inside a URI fragment. Path templates put
/// `{` and `}` into keyword pointers, which are not legal fragment bytes.
const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%')
    .add(b'^')
    .add(b'|')
    .add(b'\\');

/// Escape a single reference token per RFC 6901: `~` -> `~0`, `/` -> `~1`.
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Build a JSON pointer from unescaped tokens.
pub fn pointer(tokens: &[&str]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push('/');
        out.push_str(&escape_token(token));
    }
    out
}

/// Append one unescaped token to an existing pointer.
pub fn push_token(base: &str, token: &str) -> String {
    format!("{}/{}", base, escape_token(token))
}

/// Percent-encode a JSON pointer for use as a URI fragment.
pub fn encode_fragment(pointer: &str) -> String {
    utf8_percent_encode(pointer, FRAGMENT).to_string()
}

/// Resolve the absolute keyword location for `keyword_location`.
///
/// A relative `openapi_uri` is resolved against `https://<host>/` when the
/// request carried a `Host` header; with no host available the relative URI
/// is kept as-is so the fragment still identifies the keyword.
pub fn absolute_location(openapi_uri: &str, host: Option<&str>, keyword_location: &str) -> String {
    let fragment = encode_fragment(keyword_location);
    let base = match Url::parse(openapi_uri) {
        Ok(url) => url.to_string(),
        Err(_) => match host
            .and_then(|h| Url::parse(&format!("https://{h}/")).ok())
            .and_then(|root| root.join(openapi_uri).ok())
        {
            Some(url) => url.to_string(),
            None => openapi_uri.to_string(),
        },
    };
    format!("{base}#{fragment}")
}

/// Instance-tree locations (§ error reporting only). The tree mirrors the
/// parts of an HTTP message the validator looks at.
pub mod instance {
    use super::escape_token;

    pub const REQUEST_PATH: &str = "/request/uri/path";
    pub const REQUEST_BODY: &str = "/request/body";
    pub const RESPONSE_BODY: &str = "/response/body";
    pub const RESPONSE_STATUS: &str = "/response/status";

    pub fn request_query(name: &str) -> String {
        format!("/request/uri/query/{}", escape_token(name))
    }

    pub fn request_header(name: &str) -> String {
        format!("/request/header/{}", escape_token(name))
    }

    pub fn response_header(name: &str) -> String {
        format!("/response/header/{}", escape_token(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_token() {
        assert_eq!(escape_token("a/b"), "a~1b");
        assert_eq!(escape_token("m~n"), "m~0n");
        assert_eq!(escape_token("plain"), "plain");
    }

    #[test]
    fn test_pointer_from_tokens() {
        assert_eq!(pointer(&["paths", "/pets/{id}", "get"]), "/paths/~1pets~1{id}/get");
    }

    #[test]
    fn test_encode_fragment_escapes_braces() {
        assert_eq!(
            encode_fragment("/paths/~1pets~1{id}/get"),
            "/paths/~1pets~1%7Bid%7D/get"
        );
    }

    #[test]
    fn test_absolute_location_with_absolute_uri() {
        let loc = absolute_location("https://api.example.com/openapi.yaml", None, "/paths");
        assert_eq!(loc, "https://api.example.com/openapi.yaml#/paths");
    }

    #[test]
    fn test_absolute_location_resolves_against_host() {
        let loc = absolute_location("openapi.yaml", Some("api.example.com"), "/paths");
        assert_eq!(loc, "https://api.example.com/openapi.yaml#/paths");
    }

    #[test]
    fn test_absolute_location_without_host_keeps_relative_uri() {
        let loc = absolute_location("openapi.yaml", None, "/paths");
        assert_eq!(loc, "openapi.yaml#/paths");
    }

    #[test]
    fn test_instance_locations() {
        assert_eq!(instance::request_query("filter"), "/request/uri/query/filter");
        assert_eq!(instance::request_header("X-Trace"), "/request/header/X-Trace");
    }
}
