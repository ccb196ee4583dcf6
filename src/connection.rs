// ABOUTME: Buffered PDU writer used by the single task that owns the outgoing half of a stream
// ABOUTME: Encodes each PDU into a reusable buffer and flushes after every frame

use crate::codec::CodecError;
use crate::pdu::Pdu;
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to encode {command_id:?} (sequence {sequence_number}): {source}")]
    Encode {
        command_id: crate::datatypes::CommandId,
        sequence_number: u32,
        #[source]
        source: CodecError,
    },

    #[error("I/O error writing frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes encoded PDUs to `W`.
///
/// The stream is decorated with a `BufWriter` so each frame costs a single
/// write call; `write_pdu` flushes before returning so nothing lingers in the
/// buffer while the session waits on the peer.
#[derive(Debug)]
pub struct FrameWriter<W: AsyncWrite + Unpin> {
    stream: BufWriter<W>,

    // Reused across frames to avoid an allocation per PDU
    scratch: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W) -> Self {
        FrameWriter {
            stream: BufWriter::new(stream),
            scratch: BytesMut::with_capacity(1024),
        }
    }

    /// Encode `pdu` and write it as one frame.
    pub async fn write_pdu(&mut self, pdu: &Pdu) -> Result<(), WriteError> {
        self.scratch.clear();
        pdu.encode(&mut self.scratch)
            .map_err(|source| WriteError::Encode {
                command_id: pdu.command_id(),
                sequence_number: pdu.sequence_number(),
                source,
            })?;

        self.stream.write_all(&self.scratch).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Flush and shut down the write half so the peer observes end of stream.
    pub async fn shutdown(&mut self) -> Result<(), WriteError> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}
