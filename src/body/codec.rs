//! Decode/encode of message bodies honoring `Content-Encoding`.

use std::io::{Read, Write};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use bytes::Bytes;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use http_body::Body as HttpBody;
use tracing::trace;

use crate::error::ProxyError;

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

/// Wire encoding of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
}

impl ContentEncoding {
    /// Encoding announced by `Content-Encoding`. Anything this proxy cannot
    /// round-trip (unknown tokens, stacked codings) is treated as identity.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut values = headers.get_all(header::CONTENT_ENCODING).iter();
        let value = match (values.next(), values.next()) {
            (Some(v), None) => v,
            _ => return ContentEncoding::Identity,
        };
        let Ok(value) = value.to_str() else {
            return ContentEncoding::Identity;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => ContentEncoding::Gzip,
            "deflate" => ContentEncoding::Deflate,
            "br" => ContentEncoding::Brotli,
            _ => ContentEncoding::Identity,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
            ContentEncoding::Brotli => "br",
        }
    }
}

/// True when the message announces an empty body, either through
/// `Content-Length: 0` or an exact zero size hint.
pub fn declares_empty(headers: &HeaderMap, body: &Body) -> bool {
    let declared_zero = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        == Some(0);
    declared_zero || body.size_hint().exact() == Some(0)
}

/// Buffer a body stream, failing once it grows past `limit` bytes.
pub async fn read_to_bytes(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| ProxyError::BodyRead(Box::new(e)))
}

/// Read and decompress a body, returning the decoded bytes and an encoder
/// bound to the same encoding.
pub async fn decode(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<(Bytes, BodyEncoder), ProxyError> {
    let raw = read_to_bytes(body, limit).await?;
    decode_bytes(headers, raw, limit)
}

/// Decompress an already buffered body.
pub fn decode_bytes(
    headers: &HeaderMap,
    raw: Bytes,
    limit: usize,
) -> Result<(Bytes, BodyEncoder), ProxyError> {
    let encoding = ContentEncoding::from_headers(headers);
    if raw.is_empty() {
        return Ok((raw, BodyEncoder { encoding }));
    }
    let decoded = match encoding {
        ContentEncoding::Identity => raw,
        ContentEncoding::Gzip => inflate(MultiGzDecoder::new(&raw[..]), encoding, limit)?,
        ContentEncoding::Deflate => inflate(ZlibDecoder::new(&raw[..]), encoding, limit)?,
        ContentEncoding::Brotli => inflate(
            brotli::Decompressor::new(&raw[..], BROTLI_BUFFER),
            encoding,
            limit,
        )?,
    };
    trace!(encoding = encoding.as_str(), size = decoded.len(), "Body decoded");
    Ok((decoded, BodyEncoder { encoding }))
}

fn inflate<R: Read>(reader: R, encoding: ContentEncoding, limit: usize) -> Result<Bytes, ProxyError> {
    let mut out = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|source| ProxyError::BodyDecode {
            encoding: encoding.as_str(),
            source,
        })?;
    if out.len() > limit {
        return Err(ProxyError::BodyDecode {
            encoding: encoding.as_str(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("decoded body exceeds {limit} bytes"),
            ),
        });
    }
    Ok(Bytes::from(out))
}

/// Re-encodes a body snapshot into the encoding it was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyEncoder {
    encoding: ContentEncoding,
}

impl BodyEncoder {
    pub fn new(encoding: ContentEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    /// Produce the final wire bytes. Their length is the value the message's
    /// `Content-Length` must carry.
    pub fn write(self, data: Bytes) -> Result<Bytes, ProxyError> {
        let encoding = self.encoding;
        if data.is_empty() {
            return Ok(data);
        }
        let fail = |source| ProxyError::BodyEncode {
            encoding: encoding.as_str(),
            source,
        };
        let encoded = match encoding {
            ContentEncoding::Identity => return Ok(data),
            ContentEncoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&data).map_err(fail)?;
                encoder.finish().map_err(fail)?
            }
            ContentEncoding::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&data).map_err(fail)?;
                encoder.finish().map_err(fail)?
            }
            ContentEncoding::Brotli => {
                let mut compressed = Vec::new();
                {
                    let mut encoder = brotli::CompressorWriter::new(
                        &mut compressed,
                        BROTLI_BUFFER,
                        BROTLI_QUALITY,
                        BROTLI_WINDOW,
                    );
                    encoder.write_all(&data).map_err(fail)?;
                }
                compressed
            }
        };
        trace!(
            encoding = encoding.as_str(),
            decoded_size = data.len(),
            encoded_size = encoded.len(),
            "Body encoded"
        );
        Ok(Bytes::from(encoded))
    }
}

/// Replace any stale length/framing headers with the exact byte count.
pub fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}
