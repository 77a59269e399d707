//! MPEG audio frame extraction.
//!
//! [`FrameReader`] opens an on-disk MPEG-1 Layer III file and yields a finite
//! lazy sequence of playable frames with their intrinsic durations. It skips
//! a leading ID3v2 tag, tolerates garbage between frames via byte-wise
//! resync, and stops at end of file.
//!
//! The parser validates structural framing only; it does not check CRCs,
//! CBR/VBR consistency, or decode audio.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use thiserror::Error;

use crate::protocol_constants::{
    BITRATE_KBPS, FRAME_HEADER_LEN, ID3V2_HEADER_LEN, SAMPLES_PER_FRAME, SAMPLE_RATE_HZ,
};

/// Errors surfaced by [`FrameReader`].
///
/// Malformed or reserved headers are never errors - they are recovered
/// locally by resync. Only I/O failures and truncated frames propagate.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying file I/O failed (open, seek, or read).
    #[error("I/O error reading track: {0}")]
    Io(#[from] io::Error),

    /// The file ended inside a frame whose header promised more bytes.
    #[error("truncated frame: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Frame size announced by the header.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },
}

/// A parsed MPEG-1 Layer III frame header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Whole-frame size in bytes, 4-byte header included.
    pub frame_size: usize,
    /// Decoded bitrate (kbps).
    pub bitrate_kbps: u32,
    /// Decoded sample rate (Hz).
    pub sample_rate_hz: u32,
    /// Playback duration of the frame (milliseconds, unrounded).
    pub duration_ms: f64,
}

impl FrameHeader {
    /// Parses a 4-byte MPEG audio header.
    ///
    /// Returns `None` for anything that is not a playable MPEG-1 Layer III
    /// frame start: missing sync word, reserved version or layer bits, free
    /// or reserved bitrate index, reserved sample-rate index. Callers treat
    /// `None` as "advance one byte and retry".
    #[must_use]
    pub fn parse(header: [u8; FRAME_HEADER_LEN]) -> Option<Self> {
        // Sync word: 11 set bits across byte 0 and the top of byte 1
        if header[0] != 0xFF || header[1] & 0xE0 != 0xE0 {
            return None;
        }

        // Version (bits 4-3): reserved value 01 rejects. MPEG-2/2.5 headers
        // additionally fail the MPEG-1 rate tables below.
        if (header[1] >> 3) & 0x03 == 0b01 {
            return None;
        }

        // Layer (bits 2-1): reserved value 00 rejects
        if (header[1] >> 1) & 0x03 == 0b00 {
            return None;
        }

        let bitrate_kbps = BITRATE_KBPS[(header[2] >> 4) as usize]?;
        let sample_rate_hz = SAMPLE_RATE_HZ[((header[2] >> 2) & 0x03) as usize]?;
        let padding = ((header[2] >> 1) & 0x01) as usize;

        // Layer III frame length; integer division floors
        let frame_size = (144_000 * bitrate_kbps / sample_rate_hz) as usize + padding;
        let duration_ms = f64::from(SAMPLES_PER_FRAME) * 1000.0 / f64::from(sample_rate_hz);

        Some(Self {
            frame_size,
            bitrate_kbps,
            sample_rate_hz,
            duration_ms,
        })
    }
}

/// One playable frame: raw bytes (header included) plus playback duration.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The whole frame as read from disk.
    pub payload: Bytes,
    /// Playback duration in milliseconds.
    pub duration_ms: f64,
}

/// Sequential frame extractor over one audio file.
///
/// The file handle is owned exclusively by the reader; the engine opens one
/// reader per track and drops it at the track boundary.
pub struct FrameReader {
    file: File,
    /// Offset of the first byte after the ID3v2 tag (0 when absent).
    data_start: u64,
    /// Current read cursor.
    pos: u64,
}

impl FrameReader {
    /// Opens a file and positions the cursor after any leading ID3v2 tag.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let mut file = File::open(path)?;
        let data_start = skip_id3v2(&mut file)?;
        Ok(Self {
            file,
            data_start,
            pos: data_start,
        })
    }

    /// Yields the next frame, or `None` at end of file.
    ///
    /// Bytes that do not parse as a frame header are skipped one at a time,
    /// so garbage between frames is tolerated. Fewer than 4 readable bytes
    /// terminates the sequence; a frame cut short by EOF is an error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            self.file.seek(SeekFrom::Start(self.pos))?;

            let mut header = [0u8; FRAME_HEADER_LEN];
            if read_full(&mut self.file, &mut header)? < FRAME_HEADER_LEN {
                return Ok(None);
            }

            let Some(parsed) = FrameHeader::parse(header) else {
                // Not a frame boundary: resync one byte forward
                self.pos += 1;
                continue;
            };

            // The header is part of the payload; read the remainder in place
            let mut payload = vec![0u8; parsed.frame_size];
            payload[..FRAME_HEADER_LEN].copy_from_slice(&header);
            let got = read_full(&mut self.file, &mut payload[FRAME_HEADER_LEN..])?;
            if got < parsed.frame_size - FRAME_HEADER_LEN {
                return Err(FrameError::ShortRead {
                    expected: parsed.frame_size,
                    got: FRAME_HEADER_LEN + got,
                });
            }

            self.pos += parsed.frame_size as u64;
            return Ok(Some(Frame {
                payload: Bytes::from(payload),
                duration_ms: parsed.duration_ms,
            }));
        }
    }

    /// Rewinds to the byte following the metadata block (not offset 0),
    /// making the reader re-entrant within one file.
    pub fn reset(&mut self) {
        self.pos = self.data_start;
    }

    /// Offset of the first audio byte (after any ID3v2 tag).
    #[must_use]
    pub fn data_start(&self) -> u64 {
        self.data_start
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Consumes a leading ID3v2 tag if present and returns the audio data offset.
///
/// The tag header is 10 bytes: "ID3", two version bytes, one flags byte, and
/// a 4-byte synchsafe payload length.
fn skip_id3v2(file: &mut File) -> Result<u64, FrameError> {
    let mut header = [0u8; ID3V2_HEADER_LEN];
    let n = read_full(file, &mut header)?;
    if n == ID3V2_HEADER_LEN && header.starts_with(b"ID3") {
        let len = synchsafe_u28(&header[6..10]);
        Ok(ID3V2_HEADER_LEN as u64 + u64::from(len))
    } else {
        Ok(0)
    }
}

/// Decodes a 28-bit synchsafe integer: four bytes, high bit of each masked
/// off, concatenated MSB-first.
fn synchsafe_u28(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}
