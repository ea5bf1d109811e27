//! Length-Prefixed Package Framing
//!
//! Each frame is a 4-byte big-endian length followed by a bincode-encoded
//! [`Package`]. Works over any tokio byte stream half.

use crate::{Result, TransportError};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use types::Package;

/// Default maximum frame size
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB

const LENGTH_PREFIX_SIZE: usize = 4;

/// Reads framed packages from a byte stream
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
    max_message_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(64 * 1024),
            max_message_size,
        }
    }

    /// Read the next package.
    ///
    /// Returns `Ok(None)` when the peer closed the stream on a frame
    /// boundary; a close in the middle of a frame is an error.
    pub async fn read_package(&mut self) -> Result<Option<Package>> {
        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_SIZE {
            let read = self
                .inner
                .read(&mut len_bytes[filled..])
                .await
                .map_err(|e| TransportError::io("Failed to read length prefix", e))?;
            if read == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::closed(format!(
                    "Stream closed after {filled} of {LENGTH_PREFIX_SIZE} length prefix bytes"
                )));
            }
            filled += read;
        }

        let message_len = u32::from_be_bytes(len_bytes) as usize;
        if message_len > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: message_len,
                max: self.max_message_size,
            });
        }

        self.buffer.clear();
        self.buffer.resize(message_len, 0);
        self.inner
            .read_exact(&mut self.buffer)
            .await
            .map_err(|e| TransportError::io("Failed to read frame body", e))?;

        let package = Package::decode(&self.buffer)
            .map_err(|e| TransportError::protocol_with_source("Malformed package frame", e))?;

        debug!(
            package_id = %package.id,
            bytes = message_len,
            "Received package frame"
        );
        Ok(Some(package))
    }
}

/// Writes framed packages to a byte stream
pub struct FrameWriter<W> {
    inner: W,
    buffer: BytesMut,
    max_message_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_message_size: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(64 * 1024),
            max_message_size,
        }
    }

    /// Encode and write one package, then flush.
    ///
    /// Encoding and size failures are reported before any byte is written,
    /// so the stream stays aligned on a frame boundary.
    pub async fn write_package(&mut self, package: &Package) -> Result<()> {
        let body = package
            .encode()
            .map_err(|e| TransportError::protocol_with_source("Failed to encode package", e))?;

        if body.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: body.len(),
                max: self.max_message_size,
            });
        }

        self.buffer.clear();
        self.buffer.extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.buffer.extend_from_slice(&body);

        self.inner
            .write_all(&self.buffer)
            .await
            .map_err(|e| TransportError::io("Failed to write frame", e))?;
        self.inner
            .flush()
            .await
            .map_err(|e| TransportError::io("Failed to flush frame", e))?;

        debug!(package_id = %package.id, bytes = body.len(), "Sent package frame");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| TransportError::io("Failed to shutdown stream", e))
    }
}
