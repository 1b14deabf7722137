//! Tokio implementations of the client's transmit, delay and byte-arrival
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use esplink::{Delay, SharedRing};
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::HostError;

/// Read size for the pump; the UART IRQ delivers one byte, a host pipe more
const PUMP_CHUNK: usize = 64;

/// [`Delay`] backed by `tokio::time::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

impl Delay for TokioDelay {
    async fn delay_ms(&mut self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
    }
}

/// `embedded_io_async::Write` over any tokio writer
#[derive(Debug)]
pub struct TokioWriter<W> {
    inner: W,
}

impl<W> TokioWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> embedded_io_async::ErrorType for TokioWriter<W> {
    type Error = std::io::Error;
}

impl<W: AsyncWrite + Unpin> embedded_io_async::Write for TokioWriter<W> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self.inner.write(buf).await? {
            0 if !buf.is_empty() => Err(std::io::ErrorKind::WriteZero.into()),
            n => Ok(n),
        }
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner.flush().await
    }
}

/// Producer task: append everything read from `reader` to `ring` until EOF
///
/// Returns the number of bytes delivered.
pub async fn pump<R, M, const C: usize>(
    mut reader: R,
    ring: Arc<SharedRing<M, C>>,
) -> Result<u64, HostError>
where
    R: AsyncRead + Unpin,
    M: RawMutex,
{
    let mut chunk = [0u8; PUMP_CHUNK];
    let mut delivered = 0u64;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        ring.extend(&chunk[..n]);
        delivered += n as u64;
    }
    debug!("pump reached EOF after {} bytes", delivered);
    Ok(delivered)
}
