//! Wire formats and the pure translations between them.
//!
//! Client requests are translated into each provider's request shape, and the
//! Anthropic event stream is normalized into OpenAI-style chunks. Nothing in
//! this module performs I/O.

pub mod anthropic_types;
pub mod chat_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
