//! Request body decoding middleware for asynchronous HTTP servers.
//!
//! This crate reads an inbound request body under a hard size bound and runs it
//! through at most one content-specific decoder (gzip decompression, JSON
//! structural validation, urlencoded-to-JSON transcoding) before handing the
//! decoded bytes to the next handler. It is host-agnostic: the server framework
//! supplies a [`RequestContext`] and a [`Next`] continuation, the parser fills
//! the decoded body slot and forwards, or returns a classified [`BodyError`].
//!
//! # Example
//!
//! ```no_run
//! use body_parser::{BodyParser, BoxError, Next, RequestContext};
//! use bytes::Bytes;
//! use http::{HeaderMap, Method};
//! use http_body_util::{BodyExt, Full};
//!
//! struct Application;
//!
//! #[async_trait::async_trait]
//! impl Next for Application {
//!     async fn run(&mut self, ctx: &mut RequestContext) -> Result<(), BoxError> {
//!         println!("decoded body: {:?}", ctx.request_body());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let parser = BodyParser::with_defaults();
//!
//!     let mut headers = HeaderMap::new();
//!     headers.insert(http::header::CONTENT_TYPE, "application/json".parse()?);
//!     let body = Full::new(Bytes::from_static(b"{\"name\":\"zava\"}")).map_err(std::io::Error::other);
//!     let mut ctx = RequestContext::new(Method::POST, headers, body);
//!
//!     parser.handle(&mut ctx, Application).await
//! }
//! ```

mod context;
mod error;
mod limit;
mod parser;

pub mod decoder;

pub use context::RequestContext;
pub use error::{BodyError, ERROR_CATEGORY};
pub use limit::LimitedBody;
pub use parser::{
    json_content_type, json_or_form_content_type, BodyParser, BodyParserBuilder, BoxError, Next,
    DEFAULT_BODY_LIMIT,
};
