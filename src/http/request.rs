//! Request identification.
//!
//! # Design Decisions
//! - An incoming `x-request-id` is kept; otherwise a UUID v4 is generated
//! - The ID is set before tracing so every span carries it
//! - The same ID is echoed on the response

use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID header value, if present and printable.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_generated_ids_are_unique_uuids() {
        let request = Request::new(Body::empty());
        let mut make = UuidRequestId;
        let first = make.make_request_id(&request).unwrap();
        let second = make.make_request_id(&request).unwrap();

        let first = first.header_value().to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&first).is_ok());
        assert_ne!(first, second.header_value().to_str().unwrap());
    }

    #[test]
    fn test_request_id_lookup() {
        let request = Request::builder()
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_id(&request), "abc-123");
        assert_eq!(request_id(&Request::new(Body::empty())), "-");
    }
}
