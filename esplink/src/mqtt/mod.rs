//! # MQTT 3.1.1 Subset
//!
//! Only what a QoS0 sensor node needs:
//!
//! - **packet**: outbound CONNECT, PUBLISH, SUBSCRIBE, PINGREQ and DISCONNECT
//!   built into a bounded scratch buffer
//! - **scan**: CONNACK / SUBACK / PINGRESP pattern scans and inbound PUBLISH
//!   extraction straight out of the reception ring
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────────┬──────────────────┬─────────────────────────┐
//! │ type << 4 |  │ remaining length │   type-specific body    │
//! │    flags     │  1 byte (< 127)  │                         │
//! └──────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! Multi-byte remaining-length encoding is not supported in either direction.

pub mod packet;
pub mod scan;
