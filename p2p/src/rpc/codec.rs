//! Request and response chunk framing.
//!
//! Requests are `varint(length) | snappy frames`. Response chunks are prefixed with a result byte:
//! `code | varint(length) | snappy frames`. The length is that of the uncompressed payload.

use std::io::{Cursor, ErrorKind, Read as _, Write as _};

use bytes::{Buf as _, BufMut as _, BytesMut};
use snap::{read::FrameDecoder, write::FrameEncoder};
use strum::IntoStaticStr;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

// Error messages are truncated to this many bytes.
const MAX_ERROR_MESSAGE_LENGTH: usize = 256;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed length prefix: {0}")]
    LengthPrefix(#[from] unsigned_varint::decode::Error),
    #[error("chunk of {length} bytes exceeds limit of {max_chunk_size} bytes")]
    ChunkTooLarge { length: usize, max_chunk_size: usize },
    #[error("unknown response code {0}")]
    UnknownResponseCode(u8),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0,
    InvalidRequest = 1,
    ServerError = 2,
    ResourceUnavailable = 3,
}

impl TryFrom<u8> for ResponseCode {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Success),
            1 => Ok(Self::InvalidRequest),
            2 => Ok(Self::ServerError),
            3 => Ok(Self::ResourceUnavailable),
            _ => Err(CodecError::UnknownResponseCode(byte)),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ResponseChunk {
    pub code: ResponseCode,
    pub payload: Vec<u8>,
}

impl ResponseChunk {
    #[must_use]
    pub const fn success(payload: Vec<u8>) -> Self {
        Self {
            code: ResponseCode::Success,
            payload,
        }
    }

    #[must_use]
    pub fn error(code: ResponseCode, message: &str) -> Self {
        let mut payload = message.as_bytes().to_vec();
        payload.truncate(MAX_ERROR_MESSAGE_LENGTH);

        Self { code, payload }
    }

    #[must_use]
    pub fn error_message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Codec for the responding side: decodes requests and encodes response chunks.
pub struct InboundCodec {
    payload: PayloadCodec,
}

impl InboundCodec {
    #[must_use]
    pub const fn new(max_chunk_size: usize) -> Self {
        Self {
            payload: PayloadCodec::new(max_chunk_size),
        }
    }
}

impl Decoder for InboundCodec {
    type Item = Vec<u8>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.payload.decode(src)
    }
}

impl Encoder<ResponseChunk> for InboundCodec {
    type Error = CodecError;

    fn encode(&mut self, chunk: ResponseChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(chunk.code as u8);
        self.payload.encode(&chunk.payload, dst)
    }
}

/// Codec for the requesting side: encodes requests and decodes response chunks.
pub struct OutboundCodec {
    code: Option<ResponseCode>,
    payload: PayloadCodec,
}

impl OutboundCodec {
    #[must_use]
    pub const fn new(max_chunk_size: usize) -> Self {
        Self {
            code: None,
            payload: PayloadCodec::new(max_chunk_size),
        }
    }
}

impl Encoder<Vec<u8>> for OutboundCodec {
    type Error = CodecError;

    fn encode(&mut self, payload: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.payload.encode(&payload, dst)
    }
}

impl Decoder for OutboundCodec {
    type Item = ResponseChunk;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let code = match self.code {
            Some(code) => code,
            None => {
                if src.is_empty() {
                    return Ok(None);
                }

                let code = ResponseCode::try_from(src.get_u8())?;
                self.code = Some(code);
                code
            }
        };

        let Some(payload) = self.payload.decode(src)? else {
            return Ok(None);
        };

        self.code = None;

        Ok(Some(ResponseChunk { code, payload }))
    }
}

struct PayloadCodec {
    length: Option<usize>,
    max_chunk_size: usize,
}

impl PayloadCodec {
    const fn new(max_chunk_size: usize) -> Self {
        Self {
            length: None,
            max_chunk_size,
        }
    }

    fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        self.check_length(payload.len())?;

        let mut length_buffer = unsigned_varint::encode::usize_buffer();
        dst.extend_from_slice(unsigned_varint::encode::usize(payload.len(), &mut length_buffer));

        let mut writer = FrameEncoder::new(Vec::new());
        writer.write_all(payload)?;
        writer.flush()?;

        dst.extend_from_slice(writer.get_ref());

        Ok(())
    }

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, CodecError> {
        let length = match self.length {
            Some(length) => length,
            None => {
                let (length, prefix_length) = match unsigned_varint::decode::usize(src) {
                    Ok((length, remaining)) => (length, src.len() - remaining.len()),
                    Err(unsigned_varint::decode::Error::Insufficient) => return Ok(None),
                    Err(error) => return Err(error.into()),
                };

                self.check_length(length)?;

                src.advance(prefix_length);
                self.length = Some(length);
                length
            }
        };

        let mut reader = FrameDecoder::new(Cursor::new(&src[..]));
        let mut payload = vec![0; length];

        match read_exact(&mut reader, &mut payload, length) {
            Ok(()) => {
                let consumed = usize::try_from(reader.get_ref().position())
                    .map_err(std::io::Error::other)?;

                src.advance(consumed);
                self.length = None;

                Ok(Some(payload))
            }
            // Not enough bytes yet.
            Err(error) if error.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    const fn check_length(&self, length: usize) -> Result<(), CodecError> {
        if length > self.max_chunk_size {
            return Err(CodecError::ChunkTooLarge {
                length,
                max_chunk_size: self.max_chunk_size,
            });
        }

        Ok(())
    }
}

// Like `Read::read_exact`, but fails once more compressed bytes have been consumed than snappy
// could produce for `uncompressed_length` bytes.
fn read_exact(
    reader: &mut FrameDecoder<Cursor<&[u8]>>,
    mut buffer: &mut [u8],
    uncompressed_length: usize,
) -> std::io::Result<()> {
    let max_compressed_length = snap::raw::max_compress_len(uncompressed_length) as u64;
    let mut position = reader.get_ref().position();
    let mut consumed = 0;

    while !buffer.is_empty() {
        match reader.read(buffer) {
            Ok(0) => break,
            Ok(read) => {
                let remaining = buffer;
                buffer = &mut remaining[read..];
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }

        let current_position = reader.get_ref().position();

        if current_position <= position {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                "snappy reader did not advance",
            ));
        }

        consumed += current_position - position;
        position = current_position;

        if consumed > max_compressed_length {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                "snappy compressed data exceeds maximum compressed length",
            ));
        }
    }

    if buffer.is_empty() {
        Ok(())
    } else {
        Err(ErrorKind::UnexpectedEof.into())
    }
}
