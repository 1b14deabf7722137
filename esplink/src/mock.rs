//! Scripted modem for unit tests.
//!
//! [`MockModem`] stands in for the UART TX line. Each write is logged and
//! compared against the next pre-loaded expectation; on a match the paired
//! reply is pushed into the shared ring at once, as if the companion chip
//! had answered before the client's wait finished.

use std::collections::VecDeque;
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_io::ErrorKind;

use crate::link::Delay;
use crate::ring::{SharedRing, RECEPTION_BUFFER_SIZE};

pub(crate) type TestMutex = NoopRawMutex;
pub(crate) type TestRing = SharedRing<TestMutex>;

#[derive(Debug)]
struct Expectation {
    request: Vec<u8>,
    reply: Vec<u8>,
}

pub(crate) struct MockModem<'r, const C: usize = RECEPTION_BUFFER_SIZE> {
    ring: &'r SharedRing<TestMutex, C>,
    expectations: VecDeque<Expectation>,
    sent_log: Vec<Vec<u8>>,
    failure: Option<ErrorKind>,
}

impl<'r, const C: usize> MockModem<'r, C> {
    pub fn new(ring: &'r SharedRing<TestMutex, C>) -> Self {
        Self {
            ring,
            expectations: VecDeque::new(),
            sent_log: Vec::new(),
            failure: None,
        }
    }

    /// When a write equals `request`, push `reply` into the ring
    pub fn expect(&mut self, request: &[u8], reply: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            reply: reply.to_vec(),
        });
    }

    /// Make every following write fail with `kind`
    pub fn fail_writes(&mut self, kind: ErrorKind) {
        self.failure = Some(kind);
    }

    /// Each element is the buffer from one `write()` call
    pub fn sent_data(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }
}

impl<const C: usize> embedded_io_async::ErrorType for MockModem<'_, C> {
    type Error = ErrorKind;
}

impl<const C: usize> embedded_io_async::Write for MockModem<'_, C> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if let Some(kind) = self.failure {
            return Err(kind);
        }
        self.sent_log.push(buf.to_vec());

        let matched = self
            .expectations
            .front()
            .is_some_and(|next| next.request == buf);
        if matched {
            if let Some(next) = self.expectations.pop_front() {
                self.ring.extend(&next.reply);
            }
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Returns immediately and records every requested wait
#[derive(Debug, Default)]
pub(crate) struct MockDelay {
    waits: Vec<u32>,
}

impl MockDelay {
    pub fn waits(&self) -> &[u32] {
        &self.waits
    }
}

impl Delay for MockDelay {
    async fn delay_ms(&mut self, ms: u32) {
        self.waits.push(ms);
    }
}
