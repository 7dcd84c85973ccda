//! The decoder abstraction and its built-in implementations.
//!
//! A [`Decoder`] pairs an applicability predicate with a byte transform. The
//! pipeline scans the registered decoders in registration order and runs the
//! first one that applies; decoders are not chained (see [`select`]).

use crate::context::RequestContext;
use crate::error::BodyError;
use bytes::Bytes;

mod form;
mod gzip;
mod json;

pub use form::FormUrlEncodedDecoder;
pub use gzip::GzipDecoder;
pub use json::JsonDecoder;

/// A conditional request body rewrite.
///
/// `applies` inspects request headers only; `decode` receives the buffered
/// body and may also adjust headers to describe the decoded representation
/// (the gzip decoder removes `content-encoding`, for example).
pub trait Decoder: Send + Sync {
    fn applies(&self, ctx: &RequestContext) -> bool;

    fn decode(&self, ctx: &mut RequestContext, data: Bytes) -> Result<Bytes, BodyError>;
}

struct FnDecoder<A, D> {
    applies: A,
    decode: D,
}

impl<A, D> Decoder for FnDecoder<A, D>
where
    A: Fn(&RequestContext) -> bool + Send + Sync,
    D: Fn(&mut RequestContext, Bytes) -> Result<Bytes, BodyError> + Send + Sync,
{
    fn applies(&self, ctx: &RequestContext) -> bool {
        (self.applies)(ctx)
    }

    fn decode(&self, ctx: &mut RequestContext, data: Bytes) -> Result<Bytes, BodyError> {
        (self.decode)(ctx, data)
    }
}

/// Builds a [`Decoder`] from a pair of closures.
pub fn decoder_fn<A, D>(applies: A, decode: D) -> impl Decoder
where
    A: Fn(&RequestContext) -> bool + Send + Sync,
    D: Fn(&mut RequestContext, Bytes) -> Result<Bytes, BodyError> + Send + Sync,
{
    FnDecoder { applies, decode }
}

/// Picks the first decoder in registration order whose predicate matches.
///
/// At most one decoder runs per request, even when several would apply; a
/// request that is both gzip-encoded and declares a JSON content type is only
/// handled by whichever of the two was registered first.
pub(crate) fn select<'a>(decoders: &'a [Box<dyn Decoder>], ctx: &RequestContext) -> Option<&'a dyn Decoder> {
    decoders.iter().find(|decoder| decoder.applies(ctx)).map(AsRef::as_ref)
}

/// The first `;`-delimited field of the content-type header.
pub(crate) fn media_type(ctx: &RequestContext) -> Option<&str> {
    ctx.content_type()?.split(';').next()
}
