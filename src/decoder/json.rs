use crate::context::RequestContext;
use crate::decoder::{media_type, Decoder};
use crate::error::BodyError;
use bytes::Bytes;

/// Structural sanity check for `application/json` bodies.
///
/// This is a bracket-balance check, not a full parse: it rejects bodies that
/// cannot possibly be JSON (wrong leading or trailing byte) and accepts the
/// rest unchanged, with surrounding whitespace trimmed. An empty body decodes
/// to empty output without error.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn applies(&self, ctx: &RequestContext) -> bool {
        media_type(ctx) == Some(mime::APPLICATION_JSON.as_ref())
    }

    fn decode(&self, _ctx: &mut RequestContext, data: Bytes) -> Result<Bytes, BodyError> {
        let Some(start) = data.iter().position(|b| !b.is_ascii_whitespace()) else {
            return Ok(Bytes::new());
        };
        let Some(end) = data.iter().rposition(|b| !b.is_ascii_whitespace()) else {
            return Ok(Bytes::new());
        };

        match (data[start], data[end]) {
            (b'{', b'}') | (b'[', b']') => Ok(data.slice(start..=end)),
            _ => Err(BodyError::InvalidJson),
        }
    }
}
