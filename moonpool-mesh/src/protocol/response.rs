//! Response constructors.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};

use super::Response;

/// Plain-text error response that also closes the connection.
///
/// When `message` is `None` the canonical reason phrase is used as the body.
pub fn abort(status: StatusCode, message: Option<&str>) -> Response {
    let message = message
        .or_else(|| status.canonical_reason())
        .unwrap_or_default()
        .to_string();

    let mut response = text(message);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// `200 OK` with a plain-text body.
pub fn text(body: impl Into<String>) -> Response {
    let body = Bytes::from(body.into());
    let mut response = Response::new(Bytes::new());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    *response.body_mut() = body;
    response
}

/// `200 OK` with a JSON body.
pub fn json(value: &serde_json::Value) -> Result<Response, serde_json::Error> {
    let body = Bytes::from(serde_json::to_vec(value)?);
    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

/// `200 OK` with no body.
pub fn empty() -> Response {
    Response::new(Bytes::new())
}
