use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::debug;

/// Largest read or write issued against the socket in one call.
const IO_CHUNK: usize = 1024 * 1024;

/// Bulk transfers log progress every this many bytes.
const PROGRESS_EVERY: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("peer closed the connection ({received}/{expected} bytes received)")]
    PeerClosed { received: usize, expected: usize },
    #[error("frame of {len} bytes exceeds the {max} byte cap")]
    FrameTooLarge { len: usize, max: usize },
    #[error("malformed frame payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("transfer timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// True when the failure was the peer going away rather than a protocol
    /// violation on the wire.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::PeerClosed { .. } => true,
            FrameError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// One TCP connection owned by exactly one task. Bulk transfers use a 4-byte
/// big-endian length prefix followed by that many bytes of UTF-8 JSON; the
/// client handshake additionally needs raw reads and writes, so both styles
/// live here. Generic over the stream so tests can drive it with in-memory
/// pipes.
#[derive(Debug)]
pub struct Connection<S> {
    stream: BufStream<S>,
    max_frame_len: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, max_frame_len: usize) -> Self {
        Self {
            stream: BufStream::new(stream),
            max_frame_len,
        }
    }

    /// The unframed probe read that starts every client session: whatever the
    /// peer sent first, up to `limit` bytes.
    pub async fn recv_probe(&mut self, limit: usize) -> Result<Vec<u8>, FrameError> {
        let mut buf = vec![0u8; limit];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(FrameError::PeerClosed {
                received: 0,
                expected: 0,
            });
        }
        buf.truncate(n);
        Ok(buf)
    }

    /// Receives one length-prefixed frame body.
    pub async fn recv_frame(&mut self) -> Result<Bytes, FrameError> {
        let mut prefix = [0u8; 4];
        if let Err(e) = self.stream.read_exact(&mut prefix).await {
            return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                FrameError::PeerClosed {
                    received: 0,
                    expected: 4,
                }
            } else {
                e.into()
            });
        }
        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame_len {
            return Err(FrameError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        // accumulate the body in bounded reads
        let mut body = BytesMut::with_capacity(len.min(IO_CHUNK));
        while body.len() < len {
            let to_read = (len - body.len()).min(IO_CHUNK);
            body.reserve(to_read);
            let before = body.len();
            let n = self.stream.read_buf(&mut (&mut body).limit(to_read)).await?;
            if n == 0 {
                return Err(FrameError::PeerClosed {
                    received: before,
                    expected: len,
                });
            }
            if body.len() / PROGRESS_EVERY != before / PROGRESS_EVERY {
                debug!(
                    "received {:.1} MiB / {:.1} MiB",
                    body.len() as f64 / (1024.0 * 1024.0),
                    len as f64 / (1024.0 * 1024.0)
                );
            }
        }
        Ok(body.freeze())
    }

    /// Receives one framed value.
    pub async fn recv<V>(&mut self) -> Result<V, FrameError>
    where
        V: DeserializeOwned,
    {
        let body = self.recv_frame().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn recv_frame_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Bytes, FrameError> {
        match tokio::time::timeout(timeout, self.recv_frame()).await {
            Ok(result) => result,
            Err(_) => Err(FrameError::Timeout(timeout)),
        }
    }

    pub async fn recv_timeout<V>(
        &mut self,
        timeout: Duration,
    ) -> Result<V, FrameError>
    where
        V: DeserializeOwned,
    {
        let body = self.recv_frame_timeout(timeout).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends one framed value: 4-byte big-endian length, then the JSON body
    /// in bounded writes.
    pub async fn send<V>(&mut self, value: &V) -> Result<(), FrameError>
    where
        V: Serialize,
    {
        let body = serde_json::to_vec(value)?;
        if body.len() > u32::MAX as usize {
            return Err(FrameError::FrameTooLarge {
                len: body.len(),
                max: u32::MAX as usize,
            });
        }
        self.stream
            .write_all(&(body.len() as u32).to_be_bytes())
            .await?;
        let mut sent = 0;
        for chunk in body.chunks(IO_CHUNK) {
            self.stream.write_all(chunk).await?;
            let before = sent;
            sent += chunk.len();
            if sent / PROGRESS_EVERY != before / PROGRESS_EVERY {
                debug!(
                    "sent {:.1} MiB / {:.1} MiB",
                    sent as f64 / (1024.0 * 1024.0),
                    body.len() as f64 / (1024.0 * 1024.0)
                );
            }
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Sends a value as bare JSON, no length prefix. Handshake replies and
    /// job failure reports use this.
    pub async fn send_unframed<V>(&mut self, value: &V) -> Result<(), FrameError>
    where
        V: Serialize,
    {
        let body = serde_json::to_vec(value)?;
        self.send_raw(&body).await
    }

    /// Sends plain text, no framing.
    pub async fn send_text(&mut self, text: &str) -> Result<(), FrameError> {
        self.send_raw(text.as_bytes()).await
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
