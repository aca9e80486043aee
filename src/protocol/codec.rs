//! Line codec for the annotate tool's standard streams.
//!
//! Inbound lines are delimited by `\n`; a trailing `\r` is stripped, so a
//! tool writing either `\n` or `\r\n` decodes the same way. Outbound lines
//! are always terminated with `\r\n`, which is what the tool's console
//! reader expects.
//!
//! # Usage
//!
//! Use [`LineCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] (stdout, stderr) and
//! [`tokio_util::codec::FramedWrite`] (stdin).

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum inbound line length: 1 MiB.
///
/// A record line carries a revision, an author and a timestamp (plus the
/// source text in some tool builds); anything longer means the stream is
/// corrupt.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// CRLF-writing, newline-reading text codec.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Create a new `LineCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next line from `src`, without its terminator.
    ///
    /// Returns `Ok(None)` while `src` holds no complete line.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode a final unterminated line when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = AppError;

    /// Encode `item` followed by `\r\n` into `dst`.
    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let line = item.as_ref();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Io(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
