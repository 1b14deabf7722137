//! Full sessions against the simulated companion chip.
//!
//! The tokio clock is paused, so the client's fixed waits elapse instantly
//! once the modem and pump tasks have gone idle.

use std::sync::Arc;
use std::time::Duration;

use esplink::{AtCommand, Client, ClientConfig, Error, FrameBuilder, SessionState};
use esplink_host::{pump, HostMutex, HostRing, SimulatedModem, TokioDelay, TokioWriter};
use tokio::io::{DuplexStream, WriteHalf};

const ESSID: &str = "lab";
const PASSPHRASE: &str = "pw123456";

type HostWriter = TokioWriter<WriteHalf<DuplexStream>>;
type HostClient<'r> = Client<'r, HostWriter, TokioDelay, HostMutex>;

/// Wire a simulated modem to a fresh ring and return the client's writer
fn start(modem: SimulatedModem) -> (Arc<HostRing>, HostWriter) {
    esplink_host::init_logging();
    let (client_io, modem_io) = tokio::io::duplex(1024);
    let (rx, tx) = tokio::io::split(client_io);
    let ring = Arc::new(HostRing::new());
    tokio::spawn(pump(rx, ring.clone()));
    tokio::spawn(modem.run(modem_io));
    (ring, TokioWriter::new(tx))
}

fn client(ring: &HostRing, writer: HostWriter) -> HostClient<'_> {
    let config = ClientConfig::with_client_id("node-1").unwrap();
    Client::new(writer, TokioDelay, ring, config)
}

/// Let the modem and pump tasks deliver anything queued
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_full_session() {
    let (modem, handle) = SimulatedModem::new(ESSID, PASSPHRASE);
    let (ring, writer) = start(modem);
    let mut client = client(&ring, writer);

    client.join_network(ESSID, PASSPHRASE).await.unwrap();
    assert_eq!(client.state(), SessionState::WifiJoined);

    client.connect_broker("broker.local", 1883).await.unwrap();
    assert_eq!(client.state(), SessionState::MessagingConnected);

    assert_eq!(client.subscribe_qos0("cmd/led").await.unwrap(), 1);
    client.publish_qos0("sensors/temp", b"21.5").await.unwrap();
    client.ping().await.unwrap();
    client.disconnect().await.unwrap();
    assert_eq!(client.state(), SessionState::WifiJoined);

    let packets = handle.received_packets();
    assert_eq!(packets.len(), 5);
    assert_eq!(
        packets[0].as_slice(),
        FrameBuilder::connect(b"node-1", 60).unwrap().as_slice()
    );
    assert_eq!(
        packets[1].as_slice(),
        FrameBuilder::subscribe(1, b"cmd/led").unwrap().as_slice()
    );
    assert_eq!(
        packets[2].as_slice(),
        FrameBuilder::publish(b"sensors/temp", b"21.5").unwrap().as_slice()
    );
    assert_eq!(packets[3].as_slice(), &[0xC0, 0x00]);
    assert_eq!(packets[4].as_slice(), &[0xE0, 0x00]);

    let stats = client.stats();
    assert_eq!(stats.failed_exchanges, 0);
    assert_eq!(stats.late_bytes, 0);
    assert_eq!(stats.publishes_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_passphrase_stops_bring_up() {
    let (modem, _handle) = SimulatedModem::new(ESSID, PASSPHRASE);
    let (ring, writer) = start(modem);
    let mut client = client(&ring, writer);

    let result = client.join_network(ESSID, "not-it").await;
    assert_eq!(result, Err(Error::UnexpectedResponse));
    assert_eq!(client.state(), SessionState::RadioReady);
}

#[tokio::test(start_paused = true)]
async fn test_tcp_before_join_fails() {
    let (modem, _handle) = SimulatedModem::new(ESSID, PASSPHRASE);
    let (ring, writer) = start(modem);
    let mut client = client(&ring, writer);

    let result = client.open_session("broker.local", 1883).await;
    assert_eq!(result, Err(Error::UnexpectedResponse));
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_refused_connect() {
    let (modem, _handle) = SimulatedModem::new(ESSID, PASSPHRASE);
    let (ring, writer) = start(modem.refuse_connect(0x05));
    let mut client = client(&ring, writer);

    client.join_network(ESSID, PASSPHRASE).await.unwrap();
    let result = client.connect_broker("broker.local", 1883).await;
    assert_eq!(result, Err(Error::NoAck));
    assert_eq!(client.state(), SessionState::TcpOpen);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_publish() {
    let (modem, handle) = SimulatedModem::new(ESSID, PASSPHRASE);
    let (ring, writer) = start(modem);
    let mut client = client(&ring, writer);

    client.join_network(ESSID, PASSPHRASE).await.unwrap();
    client.connect_broker("broker.local", 1883).await.unwrap();
    client.subscribe_qos0("cmd/led").await.unwrap();
    assert_eq!(client.poll_publish().await, Ok(None));

    handle.inject_publish("cmd/led", b"on").await.unwrap();
    handle.inject_publish("cmd/led", b"off").await.unwrap();
    settle().await;

    let first = client.poll_publish().await.unwrap().unwrap();
    assert_eq!(first.topic_str(), Some("cmd/led"));
    assert_eq!(first.payload.as_slice(), b"on");
    let second = client.poll_publish().await.unwrap().unwrap();
    assert_eq!(second.payload.as_slice(), b"off");
    assert_eq!(client.poll_publish().await, Ok(None));
    assert_eq!(client.stats().publishes_received, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_bytes_are_discarded_before_command() {
    let (modem, handle) = SimulatedModem::new(ESSID, PASSPHRASE);
    let (ring, writer) = start(modem);
    let mut client = client(&ring, writer);

    handle.inject_raw(b"WIFI DISCONNECT\r\n").await.unwrap();
    settle().await;

    client.exchange(AtCommand::Probe, 1000).await.unwrap();
    assert_eq!(client.stats().late_bytes, 17);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_ping() {
    let (modem, _handle) = SimulatedModem::new(ESSID, PASSPHRASE);
    let (ring, writer) = start(modem.ignore_pings());
    let mut client = client(&ring, writer);

    client.join_network(ESSID, PASSPHRASE).await.unwrap();
    client.connect_broker("broker.local", 1883).await.unwrap();
    assert_eq!(client.ping().await, Err(Error::NoAck));
}
