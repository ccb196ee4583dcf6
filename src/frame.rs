//! SMPP v3.4 frame reader
//!
//! Splits a byte stream into complete length-prefixed frames. Reads may return
//! any number of bytes; leftovers are buffered until the next call.

use crate::codec::{PduHeader, MAX_PDU_SIZE};
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid frame length: {0}, must be 16-65536")]
    InvalidLength(u32),

    #[error("I/O error reading frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads complete frames (length prefix included) from `R`.
#[derive(Debug)]
pub struct FrameReader<R> {
    stream: R,

    // Bytes received but not yet handed out as a frame
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        FrameReader {
            stream,
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` once the stream ends. A frame cut short by the end
    /// of the stream is dropped rather than reported: a peer closing cleanly
    /// never truncates mid-frame, so only decode failures surface as errors.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        buffered = self.buffer.len(),
                        "stream closed mid-frame, dropping partial frame"
                    );
                    self.buffer.clear();
                }
                return Ok(None);
            }
        }
    }

    /// Split one frame off the buffer if enough bytes are present.
    fn parse_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]);
        if length < PduHeader::SIZE as u32 || length > MAX_PDU_SIZE {
            return Err(FrameError::InvalidLength(length));
        }

        let length = length as usize;
        if self.buffer.len() < length {
            self.buffer.reserve(length - self.buffer.len());
            return Ok(None);
        }

        Ok(Some(self.buffer.split_to(length).freeze()))
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{EnquireLink, MessageResponse};
    use crate::pdu::Pdu;
    use tokio::io::AsyncWriteExt;

    fn sample_frames() -> Vec<Bytes> {
        vec![
            Pdu::EnquireLink(EnquireLink::new(1)).to_bytes().unwrap(),
            Pdu::SubmitSmResp(MessageResponse::new(2, "abc123"))
                .to_bytes()
                .unwrap(),
            Pdu::EnquireLink(EnquireLink::new(3)).to_bytes().unwrap(),
        ]
    }

    #[tokio::test]
    async fn reads_frames_delivered_one_byte_at_a_time() {
        let frames = sample_frames();
        let (mut tx, rx) = tokio::io::duplex(1);

        let all: Vec<u8> = frames.iter().flat_map(|f| f.to_vec()).collect();
        let writer = tokio::spawn(async move {
            for byte in all {
                tx.write_all(&[byte]).await.unwrap();
            }
        });

        let mut reader = FrameReader::new(rx);
        let mut received = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            received.push(frame);
        }
        writer.await.unwrap();

        assert_eq!(received, frames);
    }

    #[tokio::test]
    async fn reads_frames_from_a_single_chunk() {
        let frames = sample_frames();
        let all: Vec<u8> = frames.iter().flat_map(|f| f.to_vec()).collect();

        let mut reader = FrameReader::new(&all[..]);
        let mut received = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            received.push(frame);
        }
        assert_eq!(received, frames);
    }

    #[tokio::test]
    async fn partial_frame_at_end_is_dropped() {
        let frames = sample_frames();
        let mut all: Vec<u8> = frames.iter().flat_map(|f| f.to_vec()).collect();
        all.truncate(all.len() - 3);

        let mut reader = FrameReader::new(&all[..]);
        let mut received = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            received.push(frame);
        }
        assert_eq!(received, frames[..2].to_vec());
    }

    #[tokio::test]
    async fn partial_length_prefix_at_end_is_dropped() {
        let data: &[u8] = &[0x00, 0x00];
        let mut reader = FrameReader::new(data);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bogus_length_is_a_framing_error() {
        let data: &[u8] = &[0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x15];
        let mut reader = FrameReader::new(data);
        assert!(matches!(
            reader.next_frame().await,
            Err(FrameError::InvalidLength(4))
        ));
    }
}
