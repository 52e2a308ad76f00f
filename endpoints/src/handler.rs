use crate::errors::EndpointError;
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use hyper::body::Bytes;
use hyper::{Request, Response};
use serde::Serialize;

/// An endpoint operating on a fully buffered request.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: Request<Bytes>) -> Result<Response<Bytes>, EndpointError>;
}

pub fn bytes_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Bytes> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Serializes a value to a JSON response.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Bytes>, EndpointError> {
    let bytes = serde_json::to_vec(value).map(Bytes::from)?;
    Ok(bytes_response(
        status,
        "application/json; charset=utf-8",
        bytes,
    ))
}
