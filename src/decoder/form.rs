use crate::context::RequestContext;
use crate::decoder::{media_type, Decoder};
use crate::error::BodyError;
use bytes::Bytes;
use serde_json::{Map, Value};

/// Transcodes `application/x-www-form-urlencoded` bodies to JSON object text.
///
/// Values are percent-decoded and grouped by key: a key seen once maps to a
/// JSON string, a key seen more than once maps to an array of strings in
/// encounter order. Object keys appear in first-seen order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormUrlEncodedDecoder;

impl Decoder for FormUrlEncodedDecoder {
    fn applies(&self, ctx: &RequestContext) -> bool {
        media_type(ctx) == Some(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
    }

    fn decode(&self, _ctx: &mut RequestContext, data: Bytes) -> Result<Bytes, BodyError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&data)?;

        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in pairs {
            match grouped.iter_mut().find(|(seen, _)| *seen == key) {
                Some((_, values)) => values.push(value),
                None => grouped.push((key, vec![value])),
            }
        }

        let mut object = Map::with_capacity(grouped.len());
        for (key, mut values) in grouped {
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            object.insert(key, value);
        }

        Ok(Bytes::from(Value::Object(object).to_string()))
    }
}
