//! Minimal HTTP message capability traits.
//!
//! The validator consumes messages through these traits rather than a
//! concrete HTTP library type. Implementations are provided for
//! `http::Request` and `http::Response` over any byte-like body; owning,
//! borrowed, or pre-buffered lazy bodies all fit behind `AsRef<[u8]>`.
//! Header access has first-value semantics throughout.

use http::{HeaderMap, Method, Uri};

pub trait HttpRequest {
    fn method(&self) -> &Method;
    fn uri(&self) -> &Uri;
    fn headers(&self) -> &HeaderMap;
    fn body_bytes(&self) -> &[u8];

    /// First value of `name`, case-insensitive; `None` for missing headers
    /// or values that are not valid UTF-8.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// The request authority, used to resolve relative document URIs.
    fn host(&self) -> Option<&str> {
        self.header("host").or_else(|| self.uri().host())
    }
}

pub trait HttpResponse {
    fn status(&self) -> u16;
    fn headers(&self) -> &HeaderMap;
    fn body_bytes(&self) -> &[u8];

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

impl<B: AsRef<[u8]>> HttpRequest for http::Request<B> {
    fn method(&self) -> &Method {
        http::Request::method(self)
    }

    fn uri(&self) -> &Uri {
        http::Request::uri(self)
    }

    fn headers(&self) -> &HeaderMap {
        http::Request::headers(self)
    }

    fn body_bytes(&self) -> &[u8] {
        self.body().as_ref()
    }
}

impl<B: AsRef<[u8]>> HttpResponse for http::Response<B> {
    fn status(&self) -> u16 {
        http::Response::status(self).as_u16()
    }

    fn headers(&self) -> &HeaderMap {
        http::Response::headers(self)
    }

    fn body_bytes(&self) -> &[u8] {
        self.body().as_ref()
    }
}

impl<T: HttpRequest + ?Sized> HttpRequest for &T {
    fn method(&self) -> &Method {
        (**self).method()
    }

    fn uri(&self) -> &Uri {
        (**self).uri()
    }

    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn body_bytes(&self) -> &[u8] {
        (**self).body_bytes()
    }
}

impl<T: HttpResponse + ?Sized> HttpResponse for &T {
    fn status(&self) -> u16 {
        (**self).status()
    }

    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn body_bytes(&self) -> &[u8] {
        (**self).body_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_impl_exposes_parts() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("https://api.example.com/pets?limit=2")
            .header("Content-Type", "application/json")
            .header("X-Multi", "first")
            .header("X-Multi", "second")
            .body(b"{}".to_vec())
            .unwrap();

        assert_eq!(HttpRequest::method(&request), &Method::POST);
        assert_eq!(HttpRequest::uri(&request).path(), "/pets");
        assert_eq!(request.header("content-type"), Some("application/json"));
        // first-value semantics for repeated names
        assert_eq!(request.header("x-multi"), Some("first"));
        assert_eq!(HttpRequest::body_bytes(&request), b"{}");
        assert_eq!(request.host(), Some("api.example.com"));
    }

    #[test]
    fn test_host_prefers_header() {
        let request = http::Request::builder()
            .uri("/pets")
            .header("Host", "internal.example.com")
            .body(Vec::new())
            .unwrap();
        assert_eq!(request.host(), Some("internal.example.com"));
    }

    #[test]
    fn test_response_impl() {
        let response = http::Response::builder()
            .status(204)
            .body(Vec::<u8>::new())
            .unwrap();
        assert_eq!(HttpResponse::status(&response), 204);
        assert!(HttpResponse::body_bytes(&response).is_empty());
    }
}
