use bytes::Bytes;
use http::{header, HeaderMap, Method};
use http_body::Body;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use std::fmt;
use std::io;
use std::mem;

/// Per-request view the pipeline operates on.
///
/// Owns the request method, a mutable header map, the raw body stream and the
/// decoded body slot. The host framework builds one per request and reads the
/// slot back after the pipeline ran; nothing here is shared across requests.
pub struct RequestContext {
    method: Method,
    headers: HeaderMap,
    body: BoxBody<Bytes, io::Error>,
    request_body: Option<Bytes>,
}

impl RequestContext {
    pub fn new<B>(method: Method, headers: HeaderMap, body: B) -> Self
    where
        B: Body<Data = Bytes, Error = io::Error> + Send + Sync + 'static,
    {
        Self { method, headers, body: BoxBody::new(body), request_body: None }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The content-type header as a string, if present and valid.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE)?.to_str().ok()
    }

    /// The decoded body slot. `None` means no body has been captured yet.
    pub fn request_body(&self) -> Option<&Bytes> {
        self.request_body.as_ref()
    }

    pub fn set_request_body(&mut self, body: Bytes) {
        self.request_body = Some(body);
    }

    /// Takes the raw body stream, leaving an empty stream behind so the raw
    /// stream is consumed at most once per request.
    pub(crate) fn take_raw_body(&mut self) -> BoxBody<Bytes, io::Error> {
        mem::replace(&mut self.body, empty_body())
    }
}

fn empty_body() -> BoxBody<Bytes, io::Error> {
    BoxBody::new(Empty::<Bytes>::new().map_err(|never| match never {}))
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("request_body", &self.request_body)
            .finish_non_exhaustive()
    }
}
