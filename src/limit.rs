//! Size-bounded request body reading.
//!
//! [`LimitedBody`] wraps a raw body stream and enforces a byte ceiling while a
//! plain read-to-completion loop drains it. The source length does not need to
//! be known up front (it may be a chunked transfer of unbounded length); the
//! wrapper counts bytes as they are produced and fails deterministically once
//! the count passes the limit.

use crate::error::BodyError;
use bytes::Bytes;
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// A body wrapper that never yields more than `limit` bytes of data.
    ///
    /// A data frame that would push the running total past the limit is
    /// truncated to the remaining budget; after that every poll returns the
    /// same [`BodyError::TooLarge`] without touching the inner stream. The
    /// reported size is the byte count the inner stream had produced when the
    /// limit was crossed. Dropping the wrapper drops the inner stream.
    pub struct LimitedBody<B> {
        #[pin]
        inner: B,
        limit: usize,
        state: State,
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Active { received: usize },
    Exhausted { size: usize },
}

impl<B> LimitedBody<B> {
    pub fn new(inner: B, limit: usize) -> Self {
        Self { inner, limit, state: State::Active { received: 0 } }
    }
}

impl<B> Body for LimitedBody<B>
where
    B: Body<Data = Bytes, Error = io::Error>,
{
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        let seen = match *this.state {
            State::Exhausted { size } => {
                return Poll::Ready(Some(Err(BodyError::too_large(size, *this.limit))));
            }
            State::Active { received } => received,
        };

        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                let data = match frame.into_data() {
                    Ok(data) => data,
                    // trailer frames carry no payload bytes
                    Err(frame) => return Poll::Ready(Some(Ok(frame))),
                };

                let budget = *this.limit - seen;
                let total = seen + data.len();

                if data.len() <= budget {
                    *this.state = State::Active { received: total };
                    return Poll::Ready(Some(Ok(Frame::data(data))));
                }

                *this.state = State::Exhausted { size: total };
                if budget == 0 {
                    Poll::Ready(Some(Err(BodyError::too_large(total, *this.limit))))
                } else {
                    Poll::Ready(Some(Ok(Frame::data(data.slice(..budget)))))
                }
            }
            Some(Err(e)) => Poll::Ready(Some(Err(BodyError::from(e)))),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self.state {
            State::Active { .. } => self.inner.is_end_stream(),
            State::Exhausted { .. } => false,
        }
    }
}

impl<B> fmt::Debug for LimitedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimitedBody")
            .field("limit", &self.limit)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
