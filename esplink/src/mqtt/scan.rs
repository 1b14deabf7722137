//! Acknowledgement scans and inbound PUBLISH extraction.
//!
//! These work on the raw reception ring, which besides MQTT bytes holds the
//! modem's own chatter (`AT+CIPSEND` echoes, `SEND OK`, `+IPD,<n>:`
//! headers). Acknowledgements are found by fixed byte patterns anywhere in
//! the ring. PUBLISH extraction looks for the first `0x30` header byte
//! outside an `+IPD` header, reads the frame through a wrapping
//! [`RingCursor`](crate::RingCursor), and zeroes the bytes it consumed.

use heapless::Vec;

use crate::error::{Error, Result};
use crate::mqtt::packet::{PacketType, MAX_REMAINING_LENGTH};
use crate::ring::ReceptionRing;

/// Longest accepted inbound topic
pub const MAX_TOPIC_LEN: usize = 127;

/// Longest possible inbound payload given the one-byte remaining length
pub const MAX_PAYLOAD_LEN: usize = MAX_REMAINING_LENGTH - 2;

/// Prefix the modem puts before data received on the TCP link
const IPD_PREFIX: &[u8] = b"+IPD,";

/// Longest `<len>` field of an `+IPD,<len>:` header
const IPD_MAX_DIGITS: usize = 5;

/// CONNACK, session-present clear, return code "accepted"
const CONNACK_ACCEPTED: [Option<u8>; 4] = [
    Some(PacketType::Connack as u8),
    Some(0x02),
    Some(0x00),
    Some(0x00),
];

const PINGRESP: [Option<u8>; 2] = [Some(PacketType::Pingresp as u8), Some(0x00)];

/// A PUBLISH taken out of the ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPublish {
    pub topic: Vec<u8, MAX_TOPIC_LEN>,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl InboundPublish {
    /// Topic as UTF-8, if it is valid
    pub fn topic_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.topic).ok()
    }
}

/// Whether an accepted CONNACK is anywhere in the ring
pub fn connack_received<const C: usize>(ring: &ReceptionRing<C>) -> bool {
    ring.cursor(0).find(&CONNACK_ACCEPTED).is_some()
}

/// Whether a SUBACK for `packet_id` is anywhere in the ring
///
/// Matches `0x90, <len>, 0x00, packet_id`; the identifier must be exact.
pub fn suback_received<const C: usize>(ring: &ReceptionRing<C>, packet_id: u8) -> bool {
    let pattern = [
        Some(PacketType::Suback as u8),
        None,
        Some(0x00),
        Some(packet_id),
    ];
    ring.cursor(0).find(&pattern).is_some()
}

pub fn pingresp_received<const C: usize>(ring: &ReceptionRing<C>) -> bool {
    ring.cursor(0).find(&PINGRESP).is_some()
}

/// Physical index of the first PUBLISH header byte outside an `+IPD` header
///
/// A header may straddle the physical end of storage, so each candidate is
/// checked backwards (with wrapping) against every header that could cover it.
pub fn find_publish<const C: usize>(ring: &ReceptionRing<C>) -> Option<usize> {
    let data = ring.as_bytes();
    (0..C).find(|&at| data[at] == PacketType::Publish as u8 && !inside_ipd_header(ring, at))
}

/// Whether physical index `at` falls within an `+IPD,<digits>:` header
fn inside_ipd_header<const C: usize>(ring: &ReceptionRing<C>, at: usize) -> bool {
    let longest = IPD_PREFIX.len() + IPD_MAX_DIGITS + 1;
    (1..longest.min(C)).any(|back| {
        let start = (at + C - back) % C;
        ipd_header_len(ring, start).is_some_and(|len| len > back)
    })
}

/// Length of an `+IPD,<digits>:` header starting at `offset`, if one is there
fn ipd_header_len<const C: usize>(ring: &ReceptionRing<C>, offset: usize) -> Option<usize> {
    let cursor = ring.cursor(offset);
    if !IPD_PREFIX
        .iter()
        .enumerate()
        .all(|(i, &b)| cursor.byte_at(i) == b)
    {
        return None;
    }
    let digits = (0..IPD_MAX_DIGITS)
        .take_while(|&i| cursor.byte_at(IPD_PREFIX.len() + i).is_ascii_digit())
        .count();
    if digits == 0 || cursor.byte_at(IPD_PREFIX.len() + digits) != b':' {
        return None;
    }
    Some(IPD_PREFIX.len() + digits + 1)
}

/// Extract the PUBLISH whose header byte sits at physical index `at`
///
/// On success exactly the frame's bytes are zeroed, wrapping past the end
/// of storage if needed, and no longer count as arrivals. The write index is
/// untouched. A remaining
/// length of 127 or more, or a topic length above [`MAX_TOPIC_LEN`] or
/// beyond the frame, clears the whole ring and fails with
/// [`Error::MalformedFrame`].
pub fn take_publish<const C: usize>(ring: &mut ReceptionRing<C>, at: usize) -> Result<InboundPublish> {
    let cursor = ring.cursor(at);
    let remaining = usize::from(cursor.byte_at(1));
    let topic_len = usize::from(cursor.u16_at(2));
    if remaining > MAX_REMAINING_LENGTH || topic_len > MAX_TOPIC_LEN || topic_len + 2 > remaining {
        warn!(
            "malformed PUBLISH at {}: remaining={} topic_len={}",
            at, remaining, topic_len
        );
        ring.clear();
        return Err(Error::MalformedFrame);
    }
    let payload_len = remaining - 2 - topic_len;

    let mut publish = InboundPublish {
        topic: Vec::new(),
        payload: Vec::new(),
    };
    // Both lengths were bounded against the capacities above
    let _ = publish.topic.resize(topic_len, 0);
    let _ = publish.payload.resize(payload_len, 0);
    cursor.copy_to(4, &mut publish.topic);
    cursor.copy_to(4 + topic_len, &mut publish.payload);

    ring.consume(at, remaining + 2);
    Ok(publish)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::packet::FrameBuilder;

    fn ring_with<const C: usize>(bytes: &[u8]) -> ReceptionRing<C> {
        let mut ring = ReceptionRing::<C>::new();
        bytes.iter().for_each(|&b| ring.append(b));
        ring
    }

    #[test]
    fn test_connack_found_at_any_offset() {
        let ring = ring_with::<64>(b"\r\nSEND OK\r\n\x20\x02\x00\x00");
        assert!(connack_received(&ring));
    }

    #[test]
    fn test_connack_refused_is_not_accepted() {
        let ring = ring_with::<64>(&[0x20, 0x02, 0x00, 0x01]);
        assert!(!connack_received(&ring));
    }

    #[test]
    fn test_connack_skips_earlier_marker() {
        let ring = ring_with::<64>(&[0x20, 0x41, 0x20, 0x02, 0x00, 0x00]);
        assert!(connack_received(&ring));
    }

    #[test]
    fn test_suback_identifier_must_match() {
        let ring = ring_with::<64>(b"SEND OK\r\n\x90\x03\x00\x02\x00");
        assert!(suback_received(&ring, 2));
        assert!(!suback_received(&ring, 3));
    }

    #[test]
    fn test_pingresp() {
        assert!(pingresp_received(&ring_with::<32>(b"OK\r\n\xD0\x00")));
        assert!(!pingresp_received(&ring_with::<32>(b"OK\r\n")));
    }

    #[test]
    fn test_publish_roundtrip_across_wrap() {
        let frame = FrameBuilder::publish(b"a/b", b"hi").unwrap();
        let mut ring = ReceptionRing::<16>::new();
        // Park the write index at 12 with bytes that are not a PUBLISH header
        for _ in 0..12 {
            ring.append(b'.');
        }
        ring.clear_range(0, 12);
        frame.iter().for_each(|&b| ring.append(b));
        assert_eq!(ring.write_index(), 5);

        let at = find_publish(&ring).unwrap();
        assert_eq!(at, 12);

        let publish = take_publish(&mut ring, at).unwrap();
        assert_eq!(publish.topic_str(), Some("a/b"));
        assert_eq!(publish.payload.as_slice(), b"hi");

        // The 9-byte frame spanned 12..16 and 0..5; all of it is zeroed
        assert_eq!(ring.as_bytes(), &[0u8; 16]);
        assert_eq!(ring.write_index(), 5);
    }

    #[test]
    fn test_publish_leaves_neighbours_intact() {
        let mut bytes = std::vec::Vec::from(&b"xy"[..]);
        bytes.extend_from_slice(&FrameBuilder::publish(b"t", b"1").unwrap());
        bytes.extend_from_slice(b"zz");
        let mut ring = ring_with::<32>(&bytes);

        let at = find_publish(&ring).unwrap();
        let publish = take_publish(&mut ring, at).unwrap();
        assert_eq!(publish.payload.as_slice(), b"1");
        assert_eq!(&ring.as_bytes()[..10], b"xy\0\0\0\0\0\0zz");
    }

    #[test]
    fn test_only_first_publish_is_taken() {
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(&FrameBuilder::publish(b"a", b"1").unwrap());
        bytes.extend_from_slice(&FrameBuilder::publish(b"b", b"2").unwrap());
        let mut ring = ring_with::<64>(&bytes);

        let at = find_publish(&ring).unwrap();
        let first = take_publish(&mut ring, at).unwrap();
        assert_eq!(first.topic.as_slice(), b"a");
        let at = find_publish(&ring).unwrap();
        let second = take_publish(&mut ring, at).unwrap();
        assert_eq!(second.topic.as_slice(), b"b");
        assert_eq!(find_publish(&ring), None);
    }

    #[test]
    fn test_remaining_length_127_clears_ring() {
        let mut ring = ring_with::<32>(&[b'x', 0x30, 127, 0x00, 0x01, b'a']);
        let at = find_publish(&ring).unwrap();
        assert_eq!(take_publish(&mut ring, at), Err(Error::MalformedFrame));
        assert_eq!(ring.as_bytes(), &[0u8; 32]);
        assert_eq!(ring.write_index(), 0);
    }

    #[test]
    fn test_topic_longer_than_frame_is_rejected() {
        let mut ring = ring_with::<32>(&[0x30, 4, 0x00, 0x09, b'a', b'b']);
        assert_eq!(take_publish(&mut ring, 0), Err(Error::MalformedFrame));
        assert_eq!(ring.write_index(), 0);
    }

    #[test]
    fn test_ipd_header_digits_are_not_publish_headers() {
        // "+IPD,10:" contains 0x30 ('0'); the real frame follows the colon
        let mut bytes = std::vec::Vec::from(&b"\r\n+IPD,10:"[..]);
        bytes.extend_from_slice(&FrameBuilder::publish(b"t/x", b"abc").unwrap());
        let mut ring = ring_with::<64>(&bytes);

        let at = find_publish(&ring).unwrap();
        assert_eq!(at, 10);
        let publish = take_publish(&mut ring, at).unwrap();
        assert_eq!(publish.topic_str(), Some("t/x"));
        assert_eq!(publish.payload.as_slice(), b"abc");
    }

    #[test]
    fn test_ipd_header_across_physical_end() {
        let mut ring = ReceptionRing::<64>::new();
        for _ in 0..58 {
            ring.append(b'.');
        }
        ring.clear_range(0, 58);
        // "+IPD,1" fills 58..64; "0:" lands at 0 and 1, the frame at 2
        b"+IPD,10:".iter().for_each(|&b| ring.append(b));
        FrameBuilder::publish(b"cmd", b"123")
            .unwrap()
            .iter()
            .for_each(|&b| ring.append(b));

        let at = find_publish(&ring).unwrap();
        assert_eq!(at, 2);
        let publish = take_publish(&mut ring, at).unwrap();
        assert_eq!(publish.topic_str(), Some("cmd"));
        assert_eq!(publish.payload.as_slice(), b"123");
    }

    #[test]
    fn test_publish_header_right_after_ipd_colon() {
        let ring = ring_with::<32>(b"+IPD,10:\x30");
        assert_eq!(find_publish(&ring), Some(8));
    }

    #[test]
    fn test_taken_frame_no_longer_counts_as_arrived() {
        let mut bytes = std::vec::Vec::from(&b"ab"[..]);
        bytes.extend_from_slice(&FrameBuilder::publish(b"t", b"1").unwrap());
        let mut ring = ring_with::<32>(&bytes);
        assert_eq!(ring.arrivals(), 8);

        let at = find_publish(&ring).unwrap();
        take_publish(&mut ring, at).unwrap();
        assert_eq!(ring.arrivals(), 2);
    }

    #[test]
    fn test_no_publish_in_empty_ring() {
        let ring = ReceptionRing::<32>::new();
        assert_eq!(find_publish(&ring), None);
    }
}
