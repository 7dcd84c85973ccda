use http::StatusCode;
use std::io;
use thiserror::Error;

/// Stable category tag carried by every [`BodyError`], for log correlation.
pub const ERROR_CATEGORY: &str = "body-parser";

/// Classified failure of the body decoding pipeline.
///
/// Every variant maps to an HTTP-equivalent status and an exception flag:
/// exceptional errors are infrastructure faults (5xx), the rest are
/// client-input faults (4xx).
#[derive(Debug, Error)]
pub enum BodyError {
    /// The underlying body stream failed for a reason other than the size limit.
    #[error("{source}")]
    ReadFailed {
        #[from]
        source: io::Error,
    },

    /// The body produced more bytes than the configured limit allows.
    #[error("request body is {size} bytes, it should be <= {limit}")]
    TooLarge { size: usize, limit: usize },

    /// The body cannot possibly be a JSON document.
    #[error("invalid json format")]
    InvalidJson,

    /// The body declared `application/x-www-form-urlencoded` but did not parse.
    ///
    /// Classified exceptional even though it is client-triggerable, matching
    /// the behavior this middleware was ported from.
    #[error("{source}")]
    MalformedForm {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    /// The body declared gzip content-encoding but was not a valid gzip stream.
    #[error("invalid gzip data: {reason}")]
    InvalidGzip { reason: String },
}

impl BodyError {
    pub fn too_large(size: usize, limit: usize) -> Self {
        Self::TooLarge { size, limit }
    }

    pub fn invalid_gzip<S: ToString>(reason: S) -> Self {
        Self::InvalidGzip { reason: reason.to_string() }
    }

    /// The HTTP-equivalent status code for this failure.
    pub fn status(&self) -> StatusCode {
        if self.is_exception() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    /// Whether this failure is an infrastructure fault rather than a
    /// client-input fault.
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::ReadFailed { .. } | Self::MalformedForm { .. })
    }

    pub fn category(&self) -> &'static str {
        ERROR_CATEGORY
    }
}
