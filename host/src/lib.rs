//! # esplink host adapters
//!
//! Runs the [`esplink`] client on a desktop host. The three collaborators
//! the client needs map onto tokio:
//!
//! ```text
//!  AsyncRead ──pump()──► Arc<HostRing> ◄── Client ──► TokioWriter<AsyncWrite>
//!                                            │
//!                                            └──► TokioDelay (tokio::time::sleep)
//! ```
//!
//! [`SimulatedModem`] plays the companion chip on the other end of a
//! `tokio::io::duplex` pipe, so whole sessions can be exercised without
//! hardware.

use std::sync::Once;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::LevelFilter;

pub mod error;
pub mod io;
pub mod sim;

pub use error::HostError;
pub use io::{pump, TokioDelay, TokioWriter};
pub use sim::{ModemHandle, SimulatedModem};

/// Lock used for the ring on a host; backed by the `critical-section` std impl
pub type HostMutex = CriticalSectionRawMutex;

/// Reception ring shared between the pump task and the client
pub type HostRing = esplink::SharedRing<HostMutex>;

static INIT_LOGGER: Once = Once::new();

/// Install `env_logger` once; `RUST_LOG` overrides the default `info` level
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .is_test(cfg!(test))
            .try_init();
        log::debug!("esplink {} host adapters ready", esplink::VERSION);
    });
}
