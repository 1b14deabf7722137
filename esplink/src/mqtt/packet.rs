//! Outbound packet construction.
//!
//! Every packet is built into a [`Frame`] of [`TX_BUFFER_SIZE`] bytes: the
//! fixed header byte, a remaining-length placeholder patched once the body
//! is written, then the body. Anything that would not fit fails with
//! [`FrameError::Overflow`] instead of being truncated.

use heapless::Vec;

use crate::TX_BUFFER_SIZE;

/// Largest remaining length expressible in the single-byte encoding we use
pub const MAX_REMAINING_LENGTH: usize = 126;

/// Protocol name carried in CONNECT
pub const PROTOCOL_NAME: &[u8] = b"MQTT";

/// Protocol level for MQTT 3.1.1
pub const PROTOCOL_LEVEL: u8 = 0x04;

/// CONNECT flags: clean session, no will, no credentials
pub const CONNECT_FLAGS_CLEAN_SESSION: u8 = 0x02;

/// An encoded outbound packet
pub type Frame = Vec<u8, TX_BUFFER_SIZE>;

/// First byte of each packet kind we send or recognise (type << 4 | flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Connect = 0x10,
    Connack = 0x20,
    /// PUBLISH with QoS0, no DUP, no RETAIN
    Publish = 0x30,
    /// SUBSCRIBE; the reserved flag bits must be 0b0010
    Subscribe = 0x82,
    Suback = 0x90,
    Pingreq = 0xC0,
    Pingresp = 0xD0,
    Disconnect = 0xE0,
}

impl TryFrom<u8> for PacketType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Self::Connect),
            0x20 => Ok(Self::Connack),
            0x30 => Ok(Self::Publish),
            0x82 => Ok(Self::Subscribe),
            0x90 => Ok(Self::Suback),
            0xC0 => Ok(Self::Pingreq),
            0xD0 => Ok(Self::Pingresp),
            0xE0 => Ok(Self::Disconnect),
            _ => Err(()),
        }
    }
}

/// Errors during frame building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Packet does not fit the scratch buffer or the one-byte length field
    Overflow,
}

/// Appends fields to a frame under construction
struct FrameWriter {
    buf: Frame,
}

impl FrameWriter {
    fn new(packet_type: PacketType) -> Self {
        let mut buf = Frame::new();
        // Capacity is far above two bytes
        let _ = buf.extend_from_slice(&[packet_type as u8, 0x00]);
        Self { buf }
    }

    fn put(&mut self, byte: u8) -> Result<(), FrameError> {
        self.buf.push(byte).map_err(|_| FrameError::Overflow)
    }

    fn put_slice(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        self.buf
            .extend_from_slice(bytes)
            .map_err(|_| FrameError::Overflow)
    }

    fn put_u16(&mut self, value: u16) -> Result<(), FrameError> {
        self.put_slice(&value.to_be_bytes())
    }

    /// Length-prefixed string field
    fn put_prefixed(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        let len = u16::try_from(bytes.len()).map_err(|_| FrameError::Overflow)?;
        self.put_u16(len)?;
        self.put_slice(bytes)
    }

    /// Patch the remaining-length byte
    fn finish(mut self) -> Result<Frame, FrameError> {
        let remaining = self.buf.len() - 2;
        if remaining > MAX_REMAINING_LENGTH {
            return Err(FrameError::Overflow);
        }
        self.buf[1] = remaining as u8;
        Ok(self.buf)
    }
}

/// Builder for the packets the client sends
pub struct FrameBuilder;

impl FrameBuilder {
    /// CONNECT with clean session and the given client identifier
    pub fn connect(client_id: &[u8], keep_alive_secs: u8) -> Result<Frame, FrameError> {
        let mut w = FrameWriter::new(PacketType::Connect);
        w.put_prefixed(PROTOCOL_NAME)?;
        w.put(PROTOCOL_LEVEL)?;
        w.put(CONNECT_FLAGS_CLEAN_SESSION)?;
        w.put_u16(u16::from(keep_alive_secs))?;
        w.put_prefixed(client_id)?;
        w.finish()
    }

    /// PUBLISH at QoS0; the payload length is implied by the remaining length
    pub fn publish(topic: &[u8], payload: &[u8]) -> Result<Frame, FrameError> {
        let mut w = FrameWriter::new(PacketType::Publish);
        w.put_prefixed(topic)?;
        w.put_slice(payload)?;
        w.finish()
    }

    /// SUBSCRIBE to a single filter at QoS0
    pub fn subscribe(packet_id: u8, filter: &[u8]) -> Result<Frame, FrameError> {
        let mut w = FrameWriter::new(PacketType::Subscribe);
        w.put_u16(u16::from(packet_id))?;
        w.put_prefixed(filter)?;
        w.put(0x00)?; // requested QoS
        w.finish()
    }

    pub fn pingreq() -> Result<Frame, FrameError> {
        FrameWriter::new(PacketType::Pingreq).finish()
    }

    pub fn disconnect() -> Result<Frame, FrameError> {
        FrameWriter::new(PacketType::Disconnect).finish()
    }
}
