//! Transparent LZ4 compression for save streams
//!
//! Compressed saves are stored as a standard LZ4 frame. Reads sniff the frame
//! magic and decompress only when it is present, so saves written without
//! compression (or by other tools) still read back unchanged.

use crate::core::backend::{SaveReader, SaveWriter};
use crate::core::error::{Result, SaveError};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Leading bytes of every LZ4 frame (0x184D2204, little-endian)
pub const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

pub fn is_compressed(prefix: &[u8]) -> bool {
    prefix.starts_with(&LZ4_FRAME_MAGIC)
}

fn frame_error(err: lz4_flex::frame::Error) -> SaveError {
    match err {
        lz4_flex::frame::Error::IoError(io) => SaveError::from_io(io),
        other => SaveError::Decode(format!("LZ4 frame: {}", other)),
    }
}

/// Compressing wrapper around another save writer
///
/// The frame footer is written on commit. Seeking is not supported.
pub struct CompressedWriter<'a> {
    encoder: FrameEncoder<Box<dyn SaveWriter + 'a>>,
}

impl<'a> CompressedWriter<'a> {
    pub fn new(inner: Box<dyn SaveWriter + 'a>) -> Self {
        CompressedWriter {
            encoder: FrameEncoder::new(inner),
        }
    }
}

impl Write for CompressedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl Seek for CompressedWriter<'_> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "compressed save streams cannot seek",
        ))
    }
}

impl SaveWriter for CompressedWriter<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        let inner = self.encoder.finish().map_err(frame_error)?;
        inner.commit()
    }

    fn abort(self: Box<Self>) {
        // Dropping the encoder drops the inner writer uncommitted
    }
}

/// Wrap `reader` in a decoder if it holds an LZ4 frame
pub fn decompressing(mut reader: SaveReader) -> Result<Box<dyn Read + Send>> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    reader.seek(SeekFrom::Start(0))?;

    if is_compressed(&prefix[..filled]) {
        Ok(Box::new(FrameDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Compress a whole buffer into one LZ4 frame
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = FrameEncoder::new(Vec::with_capacity(data.len() / 2 + 16));
    encoder.write_all(data)?;
    encoder.finish().map_err(frame_error)
}

/// Decode `data` if it is an LZ4 frame, otherwise return it unchanged
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if !is_compressed(data) {
        return Ok(data.to_vec());
    }
    let mut out = Vec::with_capacity(data.len() * 2);
    FrameDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(SaveError::from_io)?;
    Ok(out)
}
