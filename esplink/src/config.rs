//! Client configuration.
//!
//! Every wait the bring-up and MQTT sequences use is a field of [`Timeouts`];
//! the defaults are the values the ESP8266 AT firmware has been observed to
//! answer within. [`ClientConfig`] can be stored as a compact `postcard` blob
//! (for example in a flash page) and restored at boot.

use heapless::String;
use serde::{Deserialize, Serialize};

/// Longest client identifier every MQTT 3.1.1 broker must accept
pub const CLIENT_ID_CAPACITY: usize = 23;

/// Fixed waits, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeouts {
    /// Settle time after enabling UART reception, before the first command
    pub startup_ms: u32,
    /// `AT` liveness probe
    pub probe_ms: u32,
    /// `AT+CWMODE=1`
    pub station_mode_ms: u32,
    /// `AT+CWQAP`, whose reply is not checked
    pub quit_ap_ms: u32,
    /// `AT+CWJAP`; association plus DHCP takes seconds
    pub join_ap_ms: u32,
    /// Gap between the early bring-up steps
    pub step_gap_ms: u32,
    /// Gap after `AT+CWQAP` before joining
    pub quit_gap_ms: u32,
    /// `AT+CIPMUX=0`
    pub single_connection_ms: u32,
    /// `AT+CIPSTART`
    pub open_tcp_ms: u32,
    /// `AT+CIPDINFO=0`
    pub reception_mode_ms: u32,
    /// Wait for the `>` prompt after `AT+CIPSEND`
    pub send_prompt_ms: u32,
    /// Wait after the payload has been written
    pub send_settle_ms: u32,
    /// Extra wait before scanning for CONNACK / PINGRESP
    pub ack_settle_ms: u32,
    /// Wait after spotting a PUBLISH header so the rest of the frame lands
    pub publish_settle_ms: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup_ms: 1000,
            probe_ms: 1000,
            station_mode_ms: 1000,
            quit_ap_ms: 1000,
            join_ap_ms: 10_000,
            step_gap_ms: 100,
            quit_gap_ms: 500,
            single_connection_ms: 1000,
            open_tcp_ms: 5000,
            reception_mode_ms: 2000,
            send_prompt_ms: 100,
            send_settle_ms: 100,
            ack_settle_ms: 100,
            publish_settle_ms: 30,
        }
    }
}

/// Configuration for a [`Client`](crate::Client)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub timeouts: Timeouts,
    /// MQTT keep-alive in seconds; the high byte on the wire is always zero
    pub keep_alive_secs: u8,
    /// Identifier used by [`Client::connect_broker`](crate::Client::connect_broker)
    #[serde(with = "heapless_serde")]
    pub client_id: String<CLIENT_ID_CAPACITY>,
}

impl ClientConfig {
    /// Default timeouts with the given client identifier
    ///
    /// Returns `None` if `client_id` is longer than [`CLIENT_ID_CAPACITY`].
    pub fn with_client_id(client_id: &str) -> Option<Self> {
        let mut id = String::new();
        id.push_str(client_id).ok()?;
        Some(Self {
            client_id: id,
            ..Self::default()
        })
    }

    /// Serialize into `buffer` using postcard
    pub fn to_slice<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buffer)
    }

    /// Restore a configuration written by [`to_slice`](Self::to_slice)
    pub fn from_bytes(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            keep_alive_secs: 60,
            client_id: String::new(),
        }
    }
}

/// Helper module for serde with heapless::String
mod heapless_serde {
    use heapless::String;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, const N: usize>(s: &String<N>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.as_str().serialize(serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<String<N>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: &str = Deserialize::deserialize(deserializer)?;
        let mut out = String::new();
        out.push_str(s)
            .map_err(|_| serde::de::Error::custom("string exceeds capacity"))?;
        Ok(out)
    }
}
