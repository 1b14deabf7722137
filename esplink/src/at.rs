//! # AT Command Sequencing
//!
//! Wi-Fi bring-up and TCP session establishment against the ESP8266 AT
//! firmware. Every step is an exact-match exchange:
//!
//! ```text
//! send "AT+CWMODE=1\r\n" ──► wait (fixed) ──► ring == "AT+CWMODE=1\r\r\nOK..." ? ──► clear ring
//! ```
//!
//! The modem echoes each command followed by `\r\r\n`, then zero or more
//! status lines, then `\r\nOK\r\n`. A reply one byte short, with extra
//! whitespace, or split across two waits counts as a failure.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_io_async::Write;
use heapless::String;

use crate::client::{Client, SessionState};
use crate::error::{Error, Result};
use crate::link::{transmit, Delay};

/// Capacity for a formatted command line
pub const AT_COMMAND_CAPACITY: usize = 128;

/// Capacity for a formatted expected reply
pub const AT_RESPONSE_CAPACITY: usize = 192;

/// Commands the client issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand<'a> {
    /// `AT` liveness probe
    Probe,
    /// `AT+CWMODE=1`: station mode
    StationMode,
    /// `AT+CWQAP`: leave any current access point
    QuitAccessPoint,
    /// `AT+CWJAP="<essid>","<passphrase>"`
    JoinAccessPoint { essid: &'a str, passphrase: &'a str },
    /// `AT+CIPMUX=0`: single connection mode
    SingleConnection,
    /// `AT+CIPSTART="TCP","<host>",<port>`
    OpenTcp { host: &'a str, port: u16 },
    /// `AT+CIPDINFO=0`: `+IPD` headers without remote address
    ReceptionMode,
    /// `AT+CIPSEND=<len>`: raw payload follows after the prompt
    Send { len: usize },
}

impl AtCommand<'_> {
    /// Command text without the line terminator
    fn write_body(&self, out: &mut impl fmt::Write) -> fmt::Result {
        match self {
            AtCommand::Probe => out.write_str("AT"),
            AtCommand::StationMode => out.write_str("AT+CWMODE=1"),
            AtCommand::QuitAccessPoint => out.write_str("AT+CWQAP"),
            AtCommand::JoinAccessPoint { essid, passphrase } => {
                write!(out, "AT+CWJAP=\"{essid}\",\"{passphrase}\"")
            }
            AtCommand::SingleConnection => out.write_str("AT+CIPMUX=0"),
            AtCommand::OpenTcp { host, port } => {
                write!(out, "AT+CIPSTART=\"TCP\",\"{host}\",{port}")
            }
            AtCommand::ReceptionMode => out.write_str("AT+CIPDINFO=0"),
            AtCommand::Send { len } => write!(out, "AT+CIPSEND={len}"),
        }
    }

    /// Status lines the modem prints between the echo and `OK`
    fn status_lines(&self) -> &'static str {
        match self {
            AtCommand::JoinAccessPoint { .. } => "WIFI CONNECTED\r\nWIFI GOT IP\r\n",
            AtCommand::OpenTcp { .. } => "CONNECT\r\n",
            _ => "",
        }
    }

    /// Line sent to the modem
    pub fn write_request(&self, out: &mut impl fmt::Write) -> fmt::Result {
        self.write_body(out)?;
        out.write_str("\r\n")
    }

    /// Exact bytes expected back: echo, status lines, `OK`
    pub fn write_expected(&self, out: &mut impl fmt::Write) -> fmt::Result {
        self.write_body(out)?;
        out.write_str("\r\r\n")?;
        out.write_str(self.status_lines())?;
        out.write_str("\r\nOK\r\n")
    }

    pub fn request(&self) -> Result<String<AT_COMMAND_CAPACITY>> {
        let mut line = String::new();
        self.write_request(&mut line)
            .map_err(|_| Error::CommandTooLong)?;
        Ok(line)
    }

    pub fn expected(&self) -> Result<String<AT_RESPONSE_CAPACITY>> {
        let mut reply = String::new();
        self.write_expected(&mut reply)
            .map_err(|_| Error::CommandTooLong)?;
        Ok(reply)
    }
}

impl<'r, W, D, M, const C: usize> Client<'r, W, D, M, C>
where
    W: Write,
    D: Delay,
    M: RawMutex,
{
    /// Send `command`, wait `timeout_ms`, and require the exact expected reply
    ///
    /// The ring is cleared afterwards whether or not the reply matched.
    /// Bytes that arrived since the previous clear (a late reply to an
    /// earlier command) are counted and discarded before sending.
    pub async fn exchange(&mut self, command: AtCommand<'_>, timeout_ms: u32) -> Result<()> {
        let request = command.request()?;
        let expected = command.expected()?;

        self.discard_late_bytes();
        debug!("AT > {}", request.trim_end());
        self.stats.commands_sent += 1;
        transmit(&mut self.link, request.as_bytes()).await?;

        self.delay.delay_ms(timeout_ms).await;

        let outcome = self.ring.with(|ring| {
            let outcome = if ring.matches_exact(expected.as_bytes()) {
                Ok(())
            } else if ring.arrivals() == 0 {
                Err(Error::NoResponse)
            } else {
                Err(Error::UnexpectedResponse)
            };
            ring.clear();
            outcome
        });

        if let Err(e) = outcome {
            self.stats.failed_exchanges += 1;
            warn!("AT exchange failed: {} ({:?})", request.trim_end(), e);
        }
        outcome
    }

    /// Send `command` without checking the reply, wait, then clear the ring
    pub async fn fire_and_forget(&mut self, command: AtCommand<'_>, wait_ms: u32) -> Result<()> {
        let request = command.request()?;
        self.discard_late_bytes();
        debug!("AT > {} (unchecked)", request.trim_end());
        self.stats.commands_sent += 1;
        transmit(&mut self.link, request.as_bytes()).await?;
        self.delay.delay_ms(wait_ms).await;
        self.ring.with(|ring| ring.clear());
        Ok(())
    }

    /// Bring the radio up in station mode and join `essid`
    ///
    /// Probe, station mode, leave any stale association, join. The first
    /// failing step aborts the sequence; earlier steps are not undone.
    pub async fn join_network(&mut self, essid: &str, passphrase: &str) -> Result<()> {
        let t = self.config.timeouts;
        info!("joining access point {}", essid);

        self.delay.delay_ms(t.startup_ms).await;
        self.ring.with(|ring| ring.clear());

        self.exchange(AtCommand::Probe, t.probe_ms).await?;
        self.delay.delay_ms(t.step_gap_ms).await;

        self.exchange(AtCommand::StationMode, t.station_mode_ms).await?;
        self.state = SessionState::RadioReady;
        self.delay.delay_ms(t.step_gap_ms).await;

        self.fire_and_forget(AtCommand::QuitAccessPoint, t.quit_ap_ms)
            .await?;
        self.delay.delay_ms(t.quit_gap_ms).await;

        self.exchange(AtCommand::JoinAccessPoint { essid, passphrase }, t.join_ap_ms)
            .await?;
        self.state = SessionState::WifiJoined;
        info!("joined {}", essid);
        Ok(())
    }

    /// Open the single TCP connection to `host:port`
    pub async fn open_session(&mut self, host: &str, port: u16) -> Result<()> {
        let t = self.config.timeouts;
        info!("opening TCP session to {}:{}", host, port);

        self.exchange(AtCommand::SingleConnection, t.single_connection_ms)
            .await?;
        self.exchange(AtCommand::OpenTcp { host, port }, t.open_tcp_ms)
            .await?;
        self.exchange(AtCommand::ReceptionMode, t.reception_mode_ms)
            .await?;
        self.state = SessionState::TcpOpen;
        Ok(())
    }

    /// Push `data` down the open TCP connection
    ///
    /// `AT+CIPSEND=<len>`, wait for the prompt, write the payload, wait
    /// again. The modem's replies stay in the ring for the caller to scan.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        let t = self.config.timeouts;
        let request = AtCommand::Send { len: data.len() }.request()?;
        trace!("AT > {}", request.trim_end());
        transmit(&mut self.link, request.as_bytes()).await?;
        self.delay.delay_ms(t.send_prompt_ms).await;

        transmit(&mut self.link, data).await?;
        self.delay.delay_ms(t.send_settle_ms).await;
        self.stats.bytes_transmitted += data.len() as u64;
        Ok(())
    }

    /// [`send_raw`](Self::send_raw), then forget everything that arrived meanwhile
    ///
    /// Bytes already in the ring before the call are left alone.
    pub async fn send_and_discard_response(&mut self, data: &[u8]) -> Result<()> {
        let mark = self.ring.with(|ring| ring.mark());
        let sent = self.send_raw(data).await;
        self.ring.with(|ring| ring.close_window(mark));
        sent
    }

    /// Rewind the ring to index 0, counting bytes nobody consumed
    ///
    /// Frames already taken by `poll_publish` are not counted, but their
    /// zeroed span still has to be rewound before the next exact match.
    fn discard_late_bytes(&mut self) {
        let late = self.ring.with(|ring| {
            let late = ring.arrivals().min(ring.capacity());
            ring.clear();
            late
        });
        if late > 0 {
            warn!("discarding {} late bytes before next command", late);
            self.stats.late_bytes += late as u64;
        }
    }
}
