//! # esplink
//!
//! This crate drives an ESP8266-class Wi-Fi companion chip from a
//! microcontroller over a UART byte stream:
//!
//! - **Reception Ring**: fixed-capacity circular store fed one byte per UART interrupt
//! - **AT Sequencing**: exact-match command/response exchanges for Wi-Fi and TCP bring-up
//! - **MQTT Subset**: CONNECT, PUBLISH/SUBSCRIBE at QoS0 and inbound PUBLISH parsing
//!
//! ## Architecture
//!
//! ```text
//! UART RX IRQ ──push()──► SharedRing ◄──scan/parse/clear── Client
//!                                                            │
//! UART TX  ◄──────────── embedded_io_async::Write ◄──────────┘
//! ```
//!
//! ## Timing Model
//!
//! Every exchange sends, waits a fixed configured duration, then inspects
//! the ring. The wait always elapses fully; there is no incremental polling.
//! The ring itself sits behind a blocking mutex so the producer's append and
//! the client's reads and clears never interleave.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod at;
pub mod client;
pub mod config;
pub mod error;
pub mod link;
pub mod mqtt;
pub mod ring;

#[cfg(test)]
mod mock;

// Re-export main types for convenience
pub use at::AtCommand;
pub use client::{Client, LinkStats, SessionState};
pub use config::{ClientConfig, Timeouts};
pub use error::{Error, Result};
pub use link::Delay;
pub use mqtt::packet::{FrameBuilder, FrameError, PacketType};
pub use mqtt::scan::InboundPublish;
pub use ring::{ReceptionRing, RingCursor, SharedRing, RECEPTION_BUFFER_SIZE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outbound scratch capacity for one MQTT packet
pub const TX_BUFFER_SIZE: usize = 128;
