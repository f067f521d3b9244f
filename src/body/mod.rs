//! Compression-aware body interception.
//!
//! # Data Flow
//! ```text
//! wire body (possibly gzip/deflate/br)
//!     → codec::decode (buffer up to the limit, decompress)
//!     → decoded snapshot (Bytes) handed to the middleware pipeline
//!     → BodyEncoder::write (re-compress with the same encoding)
//!     → wire bytes + exact Content-Length
//! ```
//!
//! # Design Decisions
//! - Unknown or stacked encodings pass through untouched
//! - The encoder is bound to the encoding the body arrived with
//! - Length headers are always recomputed from the final wire bytes

pub mod codec;

pub use codec::{
    declares_empty, decode, decode_bytes, read_to_bytes, set_content_length, BodyEncoder,
    ContentEncoding,
};
