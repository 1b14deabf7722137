//! # Link Capabilities
//!
//! The client consumes two capabilities from the board support code:
//!
//! - **Transmit**: any [`embedded_io_async::Write`] over the UART TX line
//! - **Delay**: the [`Delay`] trait below, used for every fixed wait
//!
//! Byte arrival is the third collaborator; the UART receive interrupt pushes
//! into a [`SharedRing`](crate::SharedRing) directly and needs no trait.
//!
//! ## Design Rationale
//!
//! Keeping both seams as traits lets the same sequencing code run on the
//! microcontroller (embassy timers, HAL UART) and on a desktop host (tokio),
//! and lets tests substitute scripted peers.

use core::future::Future;

use embedded_io::Error as _;
use embedded_io_async::Write;

use crate::error::{Error, Result};

/// Fixed-duration wait
///
/// Implementations must always wait the full duration; the protocol relies
/// on the peer having answered by the time the future resolves.
pub trait Delay {
    /// Suspend for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32) -> impl Future<Output = ()>;
}

/// Write all of `data` to `link` and flush
pub(crate) async fn transmit<W: Write>(link: &mut W, data: &[u8]) -> Result<()> {
    link.write_all(data)
        .await
        .map_err(|e| Error::Transport(e.kind()))?;
    link.flush().await.map_err(|e| Error::Transport(e.kind()))
}
