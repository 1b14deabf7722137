//! # Simulated Companion Chip
//!
//! Answers the subset of the ESP8266 AT command set the client uses, with
//! the firmware's exact echo format, and stands in for the MQTT broker
//! behind the TCP connection:
//!
//! | Input                         | Reply                                            |
//! |-------------------------------|--------------------------------------------------|
//! | `AT`, `AT+CWMODE=1`, ...      | `<echo>\r\r\n\r\nOK\r\n`                         |
//! | `AT+CWJAP="<ssid>","<pass>"`  | `WIFI CONNECTED` / `WIFI GOT IP`, or `FAIL`      |
//! | `AT+CIPSTART="TCP",...`       | `CONNECT`, or `ERROR` before joining             |
//! | `AT+CIPSEND=<n>`              | `OK\r\n> `, then the next `n` bytes are a packet |
//! | CONNECT / SUBSCRIBE / PINGREQ | `SEND OK` plus CONNACK / SUBACK / PINGRESP       |
//!
//! Broker replies arrive wrapped in `+IPD,<n>:` headers as with
//! `AT+CIPDINFO=0`. A [`ModemHandle`] injects unsolicited traffic and
//! exposes every packet the broker side received.

use std::sync::{Arc, Mutex, PoisonError};

use esplink::{FrameBuilder, PacketType};
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::HostError;

/// Depth of the unsolicited-traffic queue
const INJECT_QUEUE_DEPTH: usize = 8;

/// CONNACK return code "connection accepted"
const CONNACK_ACCEPTED: u8 = 0x00;

type PacketLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// Parser and connection state of the simulated chip
struct Session {
    essid: String,
    passphrase: String,
    connack_code: u8,
    answer_pings: bool,
    joined: bool,
    tcp_open: bool,
    /// Bytes received but not yet consumed as a line or packet
    pending: Vec<u8>,
    /// Set after `AT+CIPSEND=<n>` until `n` raw bytes have arrived
    raw_expected: Option<usize>,
    received: PacketLog,
}

/// A scripted ESP8266 reachable over any tokio byte stream
pub struct SimulatedModem {
    session: Session,
    inject_rx: mpsc::Receiver<Vec<u8>>,
}

/// Control side of a running [`SimulatedModem`]
#[derive(Clone)]
pub struct ModemHandle {
    inject_tx: mpsc::Sender<Vec<u8>>,
    received: PacketLog,
}

impl SimulatedModem {
    /// A modem that accepts only the given access point credentials
    pub fn new(essid: &str, passphrase: &str) -> (Self, ModemHandle) {
        let (inject_tx, inject_rx) = mpsc::channel(INJECT_QUEUE_DEPTH);
        let received = PacketLog::default();
        let modem = Self {
            session: Session {
                essid: essid.to_owned(),
                passphrase: passphrase.to_owned(),
                connack_code: CONNACK_ACCEPTED,
                answer_pings: true,
                joined: false,
                tcp_open: false,
                pending: Vec::new(),
                raw_expected: None,
                received: received.clone(),
            },
            inject_rx,
        };
        (modem, ModemHandle { inject_tx, received })
    }

    /// Answer CONNECT with a non-zero return code
    pub fn refuse_connect(mut self, return_code: u8) -> Self {
        self.session.connack_code = return_code;
        self
    }

    /// Never answer PINGREQ
    pub fn ignore_pings(mut self) -> Self {
        self.session.answer_pings = false;
        self
    }

    /// Serve `io` until the client side closes it
    pub async fn run<S>(self, io: S) -> Result<(), HostError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let SimulatedModem {
            mut session,
            mut inject_rx,
        } = self;
        let (mut reader, mut writer) = tokio::io::split(io);
        let mut chunk = [0u8; 256];

        loop {
            tokio::select! {
                read = reader.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        break;
                    }
                    session.pending.extend_from_slice(&chunk[..n]);
                    let reply = session.process();
                    if !reply.is_empty() {
                        writer.write_all(&reply).await?;
                    }
                }
                Some(bytes) = inject_rx.recv() => {
                    trace!("modem: injecting {} bytes", bytes.len());
                    writer.write_all(&bytes).await?;
                }
            }
        }
        debug!("modem: client closed the link");
        Ok(())
    }
}

impl ModemHandle {
    /// Deliver a PUBLISH from the broker, framed as `+IPD,<n>:<packet>`
    pub async fn inject_publish(&self, topic: &str, payload: &[u8]) -> Result<(), HostError> {
        let frame =
            FrameBuilder::publish(topic.as_bytes(), payload).map_err(esplink::Error::from)?;
        self.inject_raw(&ipd(&frame)).await
    }

    /// Deliver arbitrary bytes, such as an unsolicited status line
    pub async fn inject_raw(&self, bytes: &[u8]) -> Result<(), HostError> {
        self.inject_tx
            .send(bytes.to_vec())
            .await
            .map_err(|_| HostError::ModemStopped)
    }

    /// Every packet written after an `AT+CIPSEND` prompt, in order
    pub fn received_packets(&self) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Session {
    /// Consume complete lines and packets from `pending`, returning replies
    fn process(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            if let Some(len) = self.raw_expected {
                if self.pending.len() < len {
                    break;
                }
                let packet: Vec<u8> = self.pending.drain(..len).collect();
                self.raw_expected = None;
                self.answer_packet(&packet, &mut out);
            } else if let Some(end) = find_line_end(&self.pending) {
                let line: Vec<u8> = self.pending.drain(..end + 2).collect();
                let line = String::from_utf8_lossy(&line[..end]).into_owned();
                self.answer_command(&line, &mut out);
            } else {
                break;
            }
        }
        out
    }

    fn answer_command(&mut self, line: &str, out: &mut Vec<u8>) {
        trace!("modem: < {}", line);
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\r\n");

        let tail: &[u8] = if let Some(args) = line.strip_prefix("AT+CWJAP=") {
            let wanted = format!("\"{}\",\"{}\"", self.essid, self.passphrase);
            if args == wanted {
                self.joined = true;
                b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n"
            } else {
                b"+CWJAP:3\r\n\r\nFAIL\r\n"
            }
        } else if line.starts_with("AT+CIPSTART=\"TCP\",") {
            if self.joined {
                self.tcp_open = true;
                b"CONNECT\r\n\r\nOK\r\n"
            } else {
                b"\r\nERROR\r\n"
            }
        } else if let Some(len) = line.strip_prefix("AT+CIPSEND=") {
            match len.parse::<usize>() {
                Ok(n) if self.tcp_open => {
                    self.raw_expected = Some(n);
                    b"\r\nOK\r\n> "
                }
                _ => b"\r\nERROR\r\n",
            }
        } else {
            match line {
                "AT" | "AT+CWMODE=1" | "AT+CIPMUX=0" | "AT+CIPDINFO=0" => b"\r\nOK\r\n",
                "AT+CWQAP" if self.joined => {
                    self.joined = false;
                    self.tcp_open = false;
                    b"\r\nOK\r\nWIFI DISCONNECT\r\n"
                }
                "AT+CWQAP" => b"\r\nOK\r\n",
                _ => b"\r\nERROR\r\n",
            }
        };
        out.extend_from_slice(tail);
    }

    fn answer_packet(&mut self, packet: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(format!("\r\nRecv {} bytes\r\n\r\nSEND OK\r\n", packet.len()).as_bytes());
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(packet.to_vec());

        let packet_type = packet
            .first()
            .and_then(|&b| PacketType::try_from(b).ok());
        let reply: Option<Vec<u8>> = match packet_type {
            Some(PacketType::Connect) => Some(vec![
                PacketType::Connack as u8,
                0x02,
                0x00,
                self.connack_code,
            ]),
            Some(PacketType::Subscribe) if packet.len() >= 4 => Some(vec![
                PacketType::Suback as u8,
                0x03,
                packet[2],
                packet[3],
                0x00,
            ]),
            Some(PacketType::Pingreq) if self.answer_pings => {
                Some(vec![PacketType::Pingresp as u8, 0x00])
            }
            Some(PacketType::Disconnect) => {
                self.tcp_open = false;
                out.extend_from_slice(b"CLOSED\r\n");
                None
            }
            _ => None,
        };
        if let Some(reply) = reply {
            out.extend_from_slice(&ipd(&reply));
        }
    }
}

fn find_line_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\r\n")
}

/// Wrap TCP data the way the modem reports it with `AT+CIPDINFO=0`
fn ipd(data: &[u8]) -> Vec<u8> {
    let mut framed = format!("\r\n+IPD,{}:", data.len()).into_bytes();
    framed.extend_from_slice(data);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let (modem, _handle) = SimulatedModem::new("lab", "secret");
        modem.session
    }

    #[test]
    fn test_command_split_across_reads() {
        let mut s = session();
        s.pending.extend_from_slice(b"AT+CWM");
        assert!(s.process().is_empty());
        s.pending.extend_from_slice(b"ODE=1\r\n");
        assert_eq!(s.process(), b"AT+CWMODE=1\r\r\n\r\nOK\r\n");
    }

    #[test]
    fn test_join_checks_credentials() {
        let mut s = session();
        s.pending.extend_from_slice(b"AT+CWJAP=\"lab\",\"nope\"\r\n");
        assert!(s.process().ends_with(b"FAIL\r\n"));
        assert!(!s.joined);

        s.pending.extend_from_slice(b"AT+CWJAP=\"lab\",\"secret\"\r\n");
        assert_eq!(
            s.process(),
            b"AT+CWJAP=\"lab\",\"secret\"\r\r\nWIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n"
        );
        assert!(s.joined);
    }

    #[test]
    fn test_cipsend_consumes_raw_packet() {
        let mut s = session();
        s.joined = true;
        s.tcp_open = true;
        s.pending.extend_from_slice(b"AT+CIPSEND=2\r\n");
        assert!(s.process().ends_with(b"> "));

        s.pending.extend_from_slice(&[0xC0, 0x00]);
        let reply = s.process();
        assert!(reply.ends_with(b"+IPD,2:\xD0\x00"));
        assert_eq!(s.received.lock().unwrap().as_slice(), &[vec![0xC0u8, 0x00]]);
    }

    #[test]
    fn test_cipsend_without_connection_is_error() {
        let mut s = session();
        s.pending.extend_from_slice(b"AT+CIPSEND=4\r\n");
        assert!(s.process().ends_with(b"\r\nERROR\r\n"));
        assert_eq!(s.raw_expected, None);
    }

    #[test]
    fn test_suback_echoes_packet_id() {
        let mut s = session();
        s.tcp_open = true;
        let frame = FrameBuilder::subscribe(7, b"cmd").unwrap();
        s.pending
            .extend_from_slice(format!("AT+CIPSEND={}\r\n", frame.len()).as_bytes());
        s.pending.extend_from_slice(&frame);
        assert!(s.process().ends_with(&[0x90, 0x03, 0x00, 0x07, 0x00]));
    }
}
