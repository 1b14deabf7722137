//! # Client
//!
//! Owns everything one connection needs: the UART writer, the delay source,
//! a handle to the shared reception ring, the configuration, the SUBSCRIBE
//! packet identifier and running statistics.
//!
//! ## Session Lifecycle
//!
//! ```text
//! Disconnected ──join_network──► RadioReady ──► WifiJoined
//!                                                   │
//!                                              open_session
//!                                                   ▼
//!   MessagingConnected ◄──────mqtt_connect────── TcpOpen
//!            │
//!            └──disconnect──► WifiJoined
//! ```
//!
//! Each transition happens on the successful return of the operation that
//! reaches it. Operations do not check that the previous state holds; the
//! state is a report of how far the sequence has come.
//!
//! AT-level operations (`exchange`, `join_network`, `open_session`,
//! `send_raw`) live in [`crate::at`]; the MQTT operations are below.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_io_async::Write;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::link::Delay;
use crate::mqtt::packet::FrameBuilder;
use crate::mqtt::scan::{self, InboundPublish};
use crate::ring::{SharedRing, RECEPTION_BUFFER_SIZE};

/// How far connection bring-up has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Modem answered and is in station mode
    RadioReady,
    /// Associated with the access point and holding an IP address
    WifiJoined,
    /// TCP connection to the broker is open
    TcpOpen,
    /// Broker accepted CONNECT
    MessagingConnected,
}

/// Statistics about link activity
#[derive(Debug, Default, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// AT commands sent through `exchange` or `fire_and_forget`
    pub commands_sent: u32,
    /// Exchanges whose reply did not match
    pub failed_exchanges: u32,
    /// Payload bytes pushed through `AT+CIPSEND`
    pub bytes_transmitted: u64,
    /// Bytes found in the ring before a command was sent
    pub late_bytes: u64,
    pub publishes_sent: u32,
    pub publishes_received: u32,
    /// Inbound frames rejected for unsupported lengths
    pub malformed_frames: u32,
}

/// Connection to one broker through the companion chip
pub struct Client<'r, W, D, M: RawMutex, const C: usize = RECEPTION_BUFFER_SIZE> {
    pub(crate) link: W,
    pub(crate) delay: D,
    pub(crate) ring: &'r SharedRing<M, C>,
    pub(crate) config: ClientConfig,
    pub(crate) state: SessionState,
    pub(crate) stats: LinkStats,
    /// Identifier for the next SUBSCRIBE; never zero
    packet_id: u8,
}

impl<'r, W, D, M, const C: usize> Client<'r, W, D, M, C>
where
    W: Write,
    D: Delay,
    M: RawMutex,
{
    pub fn new(link: W, delay: D, ring: &'r SharedRing<M, C>, config: ClientConfig) -> Self {
        Self {
            link,
            delay,
            ring,
            config,
            state: SessionState::Disconnected,
            stats: LinkStats::default(),
            packet_id: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Identifier the next SUBSCRIBE will carry
    pub fn next_packet_id(&self) -> u8 {
        self.packet_id
    }

    pub fn link(&self) -> &W {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut W {
        &mut self.link
    }

    /// Give back the writer and delay source
    pub fn into_parts(self) -> (W, D) {
        (self.link, self.delay)
    }

    /// Open the TCP session and send CONNECT with the configured identity
    pub async fn connect_broker(&mut self, host: &str, port: u16) -> Result<()> {
        self.open_session(host, port).await?;
        let config = self.config.clone();
        self.mqtt_connect(config.client_id.as_bytes(), config.keep_alive_secs)
            .await
    }

    /// Send CONNECT and wait for an accepting CONNACK
    pub async fn mqtt_connect(&mut self, client_id: &[u8], keep_alive_secs: u8) -> Result<()> {
        let frame = FrameBuilder::connect(client_id, keep_alive_secs)?;

        self.ring.with(|ring| ring.clear());
        self.send_raw(&frame).await?;
        self.delay.delay_ms(self.config.timeouts.ack_settle_ms).await;

        let accepted = self.ring.with(|ring| {
            let found = scan::connack_received(ring);
            ring.clear();
            found
        });
        if !accepted {
            warn!("no CONNACK from broker");
            return Err(Error::NoAck);
        }
        self.state = SessionState::MessagingConnected;
        info!("MQTT session established");
        Ok(())
    }

    /// Publish `payload` on `topic` at QoS0
    ///
    /// Whatever the modem or broker sends while the packet goes out is
    /// discarded; bytes that were already waiting in the ring stay.
    pub async fn publish_qos0(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        let frame = FrameBuilder::publish(topic.as_bytes(), payload)?;
        trace!("PUBLISH {} ({} bytes)", topic, payload.len());
        self.send_and_discard_response(&frame).await?;
        self.stats.publishes_sent += 1;
        Ok(())
    }

    /// Subscribe to `filter` at QoS0 and wait for the matching SUBACK
    ///
    /// Returns the packet identifier used. The identifier only advances once
    /// a SUBACK confirms it, so a failed attempt can be retried under the
    /// same identifier.
    pub async fn subscribe_qos0(&mut self, filter: &str) -> Result<u8> {
        let packet_id = self.packet_id;
        let frame = FrameBuilder::subscribe(packet_id, filter.as_bytes())?;

        self.ring.with(|ring| ring.clear());
        self.send_raw(&frame).await?;

        let acked = self.ring.with(|ring| {
            let found = scan::suback_received(ring, packet_id);
            ring.clear();
            found
        });
        if !acked {
            warn!("no SUBACK for {} (id {})", filter, packet_id);
            return Err(Error::NoAck);
        }
        // Zero is not a valid packet identifier
        self.packet_id = match packet_id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        debug!("subscribed to {} (id {})", filter, packet_id);
        Ok(packet_id)
    }

    /// Send PINGREQ and wait for PINGRESP
    pub async fn ping(&mut self) -> Result<()> {
        let frame = FrameBuilder::pingreq()?;

        self.ring.with(|ring| ring.clear());
        self.send_raw(&frame).await?;
        self.delay.delay_ms(self.config.timeouts.ack_settle_ms).await;

        let answered = self.ring.with(|ring| {
            let found = scan::pingresp_received(ring);
            ring.clear();
            found
        });
        if answered {
            Ok(())
        } else {
            Err(Error::NoAck)
        }
    }

    /// Send DISCONNECT; the broker closes the TCP connection in response
    pub async fn disconnect(&mut self) -> Result<()> {
        let frame = FrameBuilder::disconnect()?;
        self.send_and_discard_response(&frame).await?;
        self.state = SessionState::WifiJoined;
        info!("MQTT session closed");
        Ok(())
    }

    /// Take the first inbound PUBLISH out of the ring
    ///
    /// `Ok(None)` if no PUBLISH header is present. When one is found the
    /// client waits briefly for the rest of the frame before reading it.
    /// Call repeatedly to drain several frames.
    pub async fn poll_publish(&mut self) -> Result<Option<InboundPublish>> {
        let Some(at) = self.ring.with(|ring| scan::find_publish(ring)) else {
            return Ok(None);
        };
        self.delay
            .delay_ms(self.config.timeouts.publish_settle_ms)
            .await;

        match self.ring.with(|ring| scan::take_publish(ring, at)) {
            Ok(publish) => {
                self.stats.publishes_received += 1;
                Ok(Some(publish))
            }
            Err(e) => {
                self.stats.malformed_frames += 1;
                Err(e)
            }
        }
    }
}
