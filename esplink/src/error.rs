//! Error type shared by every fallible client operation.
//!
//! The wire protocol itself only tells success from failure; the variants
//! here record which stage failed so callers and logs can tell a silent
//! peer from a garbled reply or a broken UART.

use core::fmt;

use embedded_io::ErrorKind;

use crate::mqtt::packet::FrameError;

/// Errors returned by [`Client`](crate::Client) operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Nothing arrived before the wait elapsed
    NoResponse,
    /// Bytes arrived but did not exactly match the expected reply
    UnexpectedResponse,
    /// The expected acknowledgement pattern was not found in the ring
    NoAck,
    /// An inbound frame carried an unsupported length; the ring was cleared
    MalformedFrame,
    /// A formatted AT command or its expected reply exceeds the line buffer
    CommandTooLong,
    /// Building an outbound MQTT packet failed
    Frame(FrameError),
    /// The UART writer reported an error
    Transport(ErrorKind),
}

/// Result type alias for client operations
pub type Result<T> = core::result::Result<T, Error>;

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::Frame(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoResponse => f.write_str("no response before timeout"),
            Error::UnexpectedResponse => f.write_str("response did not match"),
            Error::NoAck => f.write_str("acknowledgement not received"),
            Error::MalformedFrame => f.write_str("malformed inbound frame"),
            Error::CommandTooLong => f.write_str("AT command exceeds line buffer"),
            Error::Frame(e) => write!(f, "frame error: {e:?}"),
            Error::Transport(kind) => write!(f, "transport error: {kind:?}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frame_error() {
        assert_eq!(Error::from(FrameError::Overflow), Error::Frame(FrameError::Overflow));
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::NoResponse.to_string(), "no response before timeout");
        assert_eq!(
            Error::Transport(ErrorKind::TimedOut).to_string(),
            "transport error: TimedOut"
        );
    }
}
