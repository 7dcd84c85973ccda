//! The pipeline controller: gating, bounded reading, decoder dispatch.

use crate::context::RequestContext;
use crate::decoder::{self, Decoder, GzipDecoder, JsonDecoder};
use crate::error::BodyError;
use crate::limit::LimitedBody;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use http_body_util::BodyExt;
use std::error::Error;
use std::fmt;
use tracing::{debug, trace};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Default request body size limit: 50 KiB.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024;

type Predicate = Box<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// The continuation invoked once the body slot is settled.
#[async_trait]
pub trait Next: Send {
    async fn run(&mut self, ctx: &mut RequestContext) -> Result<(), BoxError>;
}

/// Matches requests whose content-type starts with `application/json`.
pub fn json_content_type(ctx: &RequestContext) -> bool {
    ctx.content_type().is_some_and(|ct| ct.starts_with(mime::APPLICATION_JSON.as_ref()))
}

/// Matches requests whose content-type starts with `application/json` or
/// `application/x-www-form-urlencoded`.
pub fn json_or_form_content_type(ctx: &RequestContext) -> bool {
    ctx.content_type().is_some_and(|ct| {
        ct.starts_with(mime::APPLICATION_JSON.as_ref())
            || ct.starts_with(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
    })
}

/// Request body decoding pipeline.
///
/// Built once at startup and shared across requests; it holds no per-request
/// state, so concurrent `handle` calls from many workers are safe.
pub struct BodyParser {
    limit: usize,
    decoders: Vec<Box<dyn Decoder>>,
    skip: Predicate,
    content_type_gate: Predicate,
    allowed_methods: Vec<Method>,
}

impl BodyParser {
    pub fn builder() -> BodyParserBuilder {
        BodyParserBuilder::new()
    }

    /// The default pipeline: gzip decompression then JSON structural
    /// validation, gated on a JSON content type.
    pub fn with_defaults() -> Self {
        Self::builder().decoder(GzipDecoder).decoder(JsonDecoder).build()
    }

    /// Runs the pipeline for one request.
    ///
    /// Gated-out requests (skip predicate, pre-captured body slot, content
    /// type mismatch, non-mutating method) continue to `next` untouched.
    /// Otherwise the raw stream is read under the size limit, the first
    /// applicable decoder runs, the decoded bytes land in the body slot and
    /// `next` runs; its error, if any, is propagated. On failure `next` is
    /// never invoked and the classified error is returned.
    pub async fn handle<N: Next>(&self, ctx: &mut RequestContext, mut next: N) -> Result<(), BoxError> {
        if (self.skip)(ctx)
            || ctx.request_body().is_some()
            || !(self.content_type_gate)(ctx)
            || !self.allowed_methods.contains(ctx.method())
        {
            return next.run(ctx).await;
        }

        let raw = self.read_body(ctx).await?;

        let decoded = match decoder::select(&self.decoders, ctx) {
            Some(decoder) => {
                trace!(size = raw.len(), "decoding request body");
                match decoder.decode(ctx, raw) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        debug!(error = %e, "decode request body failed");
                        return Err(e.into());
                    }
                }
            }
            None => raw,
        };

        ctx.set_request_body(decoded);
        next.run(ctx).await
    }

    async fn read_body(&self, ctx: &mut RequestContext) -> Result<Bytes, BodyError> {
        let body = ctx.take_raw_body();
        let collected = if self.limit > 0 {
            LimitedBody::new(body, self.limit).collect().await
        } else {
            body.collect().await.map_err(BodyError::from)
        }?;
        Ok(collected.to_bytes())
    }
}

impl fmt::Debug for BodyParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyParser")
            .field("limit", &self.limit)
            .field("decoders", &self.decoders.len())
            .field("allowed_methods", &self.allowed_methods)
            .finish_non_exhaustive()
    }
}

pub struct BodyParserBuilder {
    limit: usize,
    decoders: Vec<Box<dyn Decoder>>,
    skip: Option<Predicate>,
    content_type_gate: Option<Predicate>,
    allowed_methods: Vec<Method>,
}

impl BodyParserBuilder {
    fn new() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
            decoders: vec![],
            skip: None,
            content_type_gate: None,
            allowed_methods: vec![Method::POST, Method::PUT, Method::PATCH],
        }
    }

    /// Sets the body size limit in bytes. `0` disables enforcement.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Appends a decoder; registration order decides selection priority.
    pub fn decoder<D: Decoder + 'static>(mut self, decoder: D) -> Self {
        self.decoders.push(Box::new(decoder));
        self
    }

    /// Requests matching this predicate bypass the pipeline entirely.
    pub fn skip<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Box::new(f));
        self
    }

    /// Replaces the content-type gate. Defaults to [`json_content_type`].
    pub fn content_type_gate<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.content_type_gate = Some(Box::new(f));
        self
    }

    /// Replaces the allowed method set. Defaults to POST, PUT and PATCH.
    pub fn allowed_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    pub fn build(self) -> BodyParser {
        BodyParser {
            limit: self.limit,
            decoders: self.decoders,
            skip: self.skip.unwrap_or_else(|| Box::new(|_| false)),
            content_type_gate: self.content_type_gate.unwrap_or_else(|| Box::new(json_content_type)),
            allowed_methods: self.allowed_methods,
        }
    }
}

impl fmt::Debug for BodyParserBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyParserBuilder")
            .field("limit", &self.limit)
            .field("decoders", &self.decoders.len())
            .field("allowed_methods", &self.allowed_methods)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decoder_fn, FormUrlEncodedDecoder};
    use http::{header, HeaderMap};
    use http_body::Frame;
    use http_body_util::{Full, StreamBody};
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Done(Arc<AtomicBool>);

    #[async_trait]
    impl Next for Done {
        async fn run(&mut self, _ctx: &mut RequestContext) -> Result<(), BoxError> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn done_flag() -> (Done, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Done(flag.clone()), flag)
    }

    fn request(method: Method, content_type: &str, body: &'static [u8]) -> RequestContext {
        let mut headers = HeaderMap::new();
        if !content_type.is_empty() {
            headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        }
        let body = Full::new(Bytes::from_static(body)).map_err(io::Error::other);
        RequestContext::new(method, headers, body)
    }

    fn json_post(body: &'static [u8]) -> RequestContext {
        request(Method::POST, "application/json", body)
    }

    fn failing_request(content_type: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        let chunks: Vec<Result<Frame<Bytes>, io::Error>> = vec![Err(io::Error::other("boom"))];
        let body = StreamBody::new(futures::stream::iter(chunks));
        RequestContext::new(Method::POST, headers, body)
    }

    #[tokio::test]
    async fn test_skip_predicate_bypasses_pipeline() {
        let parser = BodyParser::builder().skip(|_| true).decoder(JsonDecoder).build();
        let mut ctx = json_post(b"{\"name\":\"tree.xie\"}");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert!(ctx.request_body().is_none());
    }

    #[tokio::test]
    async fn test_captured_body_passes_through_without_io() {
        let parser = BodyParser::with_defaults();
        // a stream that fails when polled proves the pipeline never reads it
        let mut ctx = failing_request("application/json");
        ctx.set_request_body(Bytes::from_static(b"a"));

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.request_body().map(|b| &b[..]), Some(&b"a"[..]));
    }

    #[tokio::test]
    async fn test_get_method_passes_through() {
        let parser = BodyParser::with_defaults();
        let mut ctx = request(Method::GET, "application/json", b"{}");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert!(ctx.request_body().is_none());
    }

    #[tokio::test]
    async fn test_unrelated_content_type_passes_through() {
        let parser = BodyParser::with_defaults();
        let mut ctx = request(Method::POST, "text/plain", b"abc");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert!(ctx.request_body().is_none());
    }

    #[tokio::test]
    async fn test_read_failure_is_exceptional() {
        let parser = BodyParser::with_defaults();
        let mut ctx = failing_request("application/json");

        let (next, done) = done_flag();
        let err = parser.handle(&mut ctx, next).await.unwrap_err();

        assert!(!done.load(Ordering::SeqCst));
        let err = err.downcast_ref::<BodyError>().unwrap();
        assert!(matches!(err, BodyError::ReadFailed { .. }));
        assert!(err.is_exception());
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_body_over_limit() {
        let parser = BodyParser::builder().limit(1).decoder(JsonDecoder).build();
        let mut ctx = json_post(b"abc");

        let (next, done) = done_flag();
        let err = parser.handle(&mut ctx, next).await.unwrap_err();

        assert!(!done.load(Ordering::SeqCst));
        let err = err.downcast_ref::<BodyError>().unwrap();
        assert_eq!(err.to_string(), "request body is 3 bytes, it should be <= 1");
        assert!(!err.is_exception());
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_zero_limit_disables_enforcement() {
        let parser = BodyParser::builder().limit(0).decoder(JsonDecoder).build();
        let mut ctx = json_post(b"{\"name\":\"tree.xie\"}");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.request_body().map(|b| &b[..]), Some(&b"{\"name\":\"tree.xie\"}"[..]));
    }

    #[tokio::test]
    async fn test_json_body_decoded() {
        let parser = BodyParser::with_defaults();
        let mut ctx = json_post(b"{\"name\":\"tree.xie\"}");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.request_body().map(|b| &b[..]), Some(&b"{\"name\":\"tree.xie\"}"[..]));
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let parser = BodyParser::with_defaults();
        let mut ctx = json_post(b"abc");

        let (next, done) = done_flag();
        let err = parser.handle(&mut ctx, next).await.unwrap_err();

        assert!(!done.load(Ordering::SeqCst));
        let err = err.downcast_ref::<BodyError>().unwrap();
        assert!(matches!(err, BodyError::InvalidJson));
    }

    #[tokio::test]
    async fn test_no_matching_decoder_leaves_bytes_unchanged() {
        // gate open, decoders registered, but none applies to plain json bytes
        let parser = BodyParser::builder().decoder(GzipDecoder).build();
        let mut ctx = json_post(b"  {\"a\":1}  ");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.request_body().map(|b| &b[..]), Some(&b"  {\"a\":1}  "[..]));
    }

    #[tokio::test]
    async fn test_form_body_transcoded_to_json() {
        let parser = BodyParser::builder()
            .content_type_gate(json_or_form_content_type)
            .decoder(FormUrlEncodedDecoder)
            .build();
        let mut ctx = request(Method::POST, "application/x-www-form-urlencoded", b"name=tree.xie&type=1&type=2");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(
            ctx.request_body().map(|b| &b[..]),
            Some(&br#"{"name":"tree.xie","type":["1","2"]}"#[..])
        );
    }

    #[tokio::test]
    async fn test_registration_order_decides_selection() {
        fn gzipped_json() -> RequestContext {
            let mut ctx = json_post(b"\x1f\x8bnot really gzip");
            ctx.headers_mut().insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
            ctx
        }

        // gzip first: the gzip decoder runs and rejects the corrupt stream
        let parser = BodyParser::builder().decoder(GzipDecoder).decoder(JsonDecoder).build();
        let (next, _) = done_flag();
        let err = parser.handle(&mut gzipped_json(), next).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BodyError>().unwrap(), BodyError::InvalidGzip { .. }));

        // json first: the structural check runs instead, gzip never fires
        let parser = BodyParser::builder().decoder(JsonDecoder).decoder(GzipDecoder).build();
        let (next, _) = done_flag();
        let err = parser.handle(&mut gzipped_json(), next).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BodyError>().unwrap(), BodyError::InvalidJson));
    }

    #[tokio::test]
    async fn test_gzip_then_downstream_sees_plain_body() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(b"{\"name\":\"tree.xie\"}").unwrap();
        let compressed = encoder.finish().unwrap();

        let parser = BodyParser::with_defaults();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers.insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
        let body = Full::new(Bytes::from(compressed)).map_err(io::Error::other);
        let mut ctx = RequestContext::new(Method::POST, headers, body);

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.request_body().map(|b| &b[..]), Some(&b"{\"name\":\"tree.xie\"}"[..]));
        assert!(ctx.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_custom_decoder_fn() {
        let reverse = decoder_fn(
            |ctx: &RequestContext| ctx.content_type().is_some_and(|ct| ct.ends_with("charset=reversed")),
            |_ctx: &mut RequestContext, data: Bytes| {
                let reversed: Vec<u8> = data.iter().rev().copied().collect();
                Ok(Bytes::from(reversed))
            },
        );
        let parser = BodyParser::builder().decoder(reverse).build();
        let mut ctx = request(Method::POST, "application/json;charset=reversed", b"}1:\"a\"{");

        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.request_body().map(|b| &b[..]), Some(&b"{\"a\":1}"[..]));
    }

    #[tokio::test]
    async fn test_continuation_error_is_propagated() {
        struct FailingNext;

        #[async_trait]
        impl Next for FailingNext {
            async fn run(&mut self, _ctx: &mut RequestContext) -> Result<(), BoxError> {
                Err("downstream failed".into())
            }
        }

        let parser = BodyParser::with_defaults();
        let mut ctx = json_post(b"{}");

        let err = parser.handle(&mut ctx, FailingNext).await.unwrap_err();
        assert_eq!(err.to_string(), "downstream failed");
    }

    #[tokio::test]
    async fn test_allowed_methods_override() {
        let parser = BodyParser::builder().allowed_methods([Method::DELETE]).decoder(JsonDecoder).build();

        let mut ctx = request(Method::DELETE, "application/json", b"{}");
        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.request_body().map(|b| &b[..]), Some(&b"{}"[..]));

        let mut ctx = json_post(b"{}");
        let (next, done) = done_flag();
        parser.handle(&mut ctx, next).await.unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert!(ctx.request_body().is_none());
    }

    #[test]
    fn test_parser_is_send_and_sync() {
        fn check<T: Send + Sync>() {}
        check::<BodyParser>();
    }
}
