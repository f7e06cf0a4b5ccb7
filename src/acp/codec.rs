//! NDJSON codec shared by the editor stream and every agent channel.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length so
//! an unterminated or oversized message from either peer cannot make the
//! proxy allocate without bound.
//!
//! # Usage
//!
//! Use [`AcpCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] (inbound) and
//! [`tokio_util::codec::FramedWrite`] (outbound).
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use acp_mux::acp::codec::AcpCodec;
//!
//! let lines = FramedRead::new(tokio::io::stdin(), AcpCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted by the codec: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON codec for ACP streams.
///
/// Each `\n`-terminated UTF-8 string is one complete JSON-RPC envelope.
/// Inbound lines longer than [`MAX_LINE_BYTES`] yield
/// [`AppError::Acp`]`("line too long: …")`; the codec then discards the rest
/// of that line and resumes on the next one. I/O errors map to
/// [`AppError::Io`].
#[derive(Debug)]
pub struct AcpCodec(LinesCodec);

impl AcpCodec {
    /// Create a new `AcpCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for AcpCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // The max-length limit is a decoder-side concern only.
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Acp(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
