use crate::context::RequestContext;
use crate::decoder::Decoder;
use crate::error::BodyError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use http::header;
use std::io::Read;

const GZIP: &str = "gzip";

/// Decompresses bodies declared with `content-encoding: gzip`.
///
/// Decoding removes the `content-encoding` header so downstream handlers see
/// the decompressed representation.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipDecoder;

impl Decoder for GzipDecoder {
    fn applies(&self, ctx: &RequestContext) -> bool {
        ctx.headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|encoding| encoding == GZIP)
    }

    fn decode(&self, ctx: &mut RequestContext, data: Bytes) -> Result<Bytes, BodyError> {
        ctx.headers_mut().remove(header::CONTENT_ENCODING);

        let mut decompressed = Vec::new();
        GzDecoder::new(data.as_ref())
            .read_to_end(&mut decompressed)
            .map_err(BodyError::invalid_gzip)?;
        Ok(Bytes::from(decompressed))
    }
}
