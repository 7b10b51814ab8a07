//! HTTP/1.1 wire codec: request-line/header parsing, chunked transfer
//! encoding, range parsing (spec.md §4.4).

pub mod parse;
pub mod range;
pub mod write;

pub use parse::{ParsedHead, RequestLine};
pub use range::parse_range_header;
