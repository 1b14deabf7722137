//! # Reception Ring
//!
//! Fixed-capacity circular byte store filled one byte at a time by the UART
//! receive interrupt and inspected by the client after each wait period.
//!
//! ## Layout
//!
//! ```text
//! index 0                                    C-1
//! ┌─────────────────────────────┬──────────────┐
//! │   bytes since last clear    │   zeroed     │
//! └─────────────────────────────┴──────────────┘
//!                               ▲
//!                           write_idx
//! ```
//!
//! The ring is not a FIFO: there is no read index. Consumers interpret raw
//! positions starting at index 0 and clear the whole store between exchanges,
//! or zero a computed range after consuming a frame. Once `write_idx` wraps,
//! older unread bytes are silently overwritten.
//!
//! ## Synchronisation
//!
//! [`SharedRing`] wraps the ring in an `embassy-sync` blocking mutex, so the
//! producer's [`SharedRing::push`] and the consumer's [`SharedRing::with`]
//! critical sections never interleave.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Reception ring capacity shared by the UART driver and the client
pub const RECEPTION_BUFFER_SIZE: usize = 512;

/// Position and arrival count captured at the start of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WindowMark {
    start: usize,
    arrivals: usize,
}

impl WindowMark {
    /// Physical index the window starts at
    pub fn start(&self) -> usize {
        self.start
    }
}

/// Circular reception store of `C` bytes
pub struct ReceptionRing<const C: usize = RECEPTION_BUFFER_SIZE> {
    data: [u8; C],

    /// Next index the producer writes to
    write_idx: usize,

    /// Bytes appended since the last full clear (wrapping)
    arrivals: usize,
}

impl<const C: usize> ReceptionRing<C> {
    /// Create a zeroed ring
    pub const fn new() -> Self {
        Self {
            data: [0u8; C],
            write_idx: 0,
            arrivals: 0,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }

    /// Index the next arriving byte will be stored at
    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_idx
    }

    /// Number of bytes appended since the last [`clear`](Self::clear)
    #[inline]
    pub fn arrivals(&self) -> usize {
        self.arrivals
    }

    /// Raw backing storage
    #[inline]
    pub fn as_bytes(&self) -> &[u8; C] {
        &self.data
    }

    /// Store one arrived byte and advance the write index
    ///
    /// Never fails; unread data is overwritten once the index wraps onto it.
    #[inline]
    pub fn append(&mut self, byte: u8) {
        self.data[self.write_idx] = byte;
        self.write_idx = (self.write_idx + 1) % C;
        self.arrivals = self.arrivals.wrapping_add(1);
    }

    /// Zero the whole store and rewind the write index
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.write_idx = 0;
        self.arrivals = 0;
    }

    /// Zero `len` bytes starting at `start`, wrapping past the end
    ///
    /// The write index is left untouched. `len` is clamped to the capacity.
    pub fn clear_range(&mut self, start: usize, len: usize) {
        let start = start % C;
        let len = len.min(C);
        let first_len = len.min(C - start);
        self.data[start..start + first_len].fill(0);
        self.data[..len - first_len].fill(0);
    }

    /// Zero a consumed range and stop counting it as arrived
    ///
    /// Used after a frame has been read out of the ring; the write index is
    /// left untouched.
    pub fn consume(&mut self, start: usize, len: usize) {
        let len = len.min(C);
        self.clear_range(start, len);
        self.arrivals = self.arrivals.saturating_sub(len);
    }

    /// Open a window at the current write index
    pub fn mark(&self) -> WindowMark {
        WindowMark {
            start: self.write_idx,
            arrivals: self.arrivals,
        }
    }

    /// Discard everything that arrived since `mark` and rewind to its start
    ///
    /// If the producer wrapped all the way around during the window the
    /// whole store is zeroed.
    pub fn close_window(&mut self, mark: WindowMark) {
        let arrived = self.arrivals.wrapping_sub(mark.arrivals);
        if arrived >= C {
            self.data.fill(0);
        } else {
            self.clear_range(mark.start, arrived);
        }
        self.write_idx = mark.start;
        self.arrivals = mark.arrivals;
    }

    /// Compare the store, read from index 0 as a zero-terminated string
    ///
    /// `expected` must sit at offset 0 and be followed by a zero byte (or the
    /// physical end of storage). Stale leading bytes make this fail.
    pub fn matches_exact(&self, expected: &[u8]) -> bool {
        let len = expected.len();
        if len > C || self.data[..len] != *expected {
            return false;
        }
        len == C || self.data[len] == 0
    }

    /// Logical view with offset 0 at physical index `origin`
    pub fn cursor(&self, origin: usize) -> RingCursor<'_, C> {
        RingCursor {
            data: &self.data,
            origin: origin % C,
        }
    }
}

impl<const C: usize> Default for ReceptionRing<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapping read view over a [`ReceptionRing`]
///
/// All modular index arithmetic lives here.
#[derive(Clone, Copy)]
pub struct RingCursor<'a, const C: usize> {
    data: &'a [u8; C],
    origin: usize,
}

impl<'a, const C: usize> RingCursor<'a, C> {
    /// Logical length; always the ring capacity
    #[inline]
    pub const fn len(&self) -> usize {
        C
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        C == 0
    }

    /// Physical index of logical `offset`
    #[inline]
    pub fn physical(&self, offset: usize) -> usize {
        (self.origin + offset) % C
    }

    /// Byte at logical `offset`
    #[inline]
    pub fn byte_at(&self, offset: usize) -> u8 {
        self.data[self.physical(offset)]
    }

    /// Big-endian u16 at logical `offset`
    pub fn u16_at(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.byte_at(offset), self.byte_at(offset + 1)])
    }

    /// Copy `out.len()` bytes starting at logical `offset`
    pub fn copy_to(&self, offset: usize, out: &mut [u8]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.byte_at(offset + i);
        }
    }

    /// First logical offset where `pattern` matches; `None` entries match any byte
    ///
    /// Every offset in `0..len()` is tried, with the pattern itself read
    /// across the wrap point.
    pub fn find(&self, pattern: &[Option<u8>]) -> Option<usize> {
        (0..C).find(|&start| {
            pattern
                .iter()
                .enumerate()
                .all(|(i, expected)| expected.map_or(true, |b| self.byte_at(start + i) == b))
        })
    }
}

/// [`ReceptionRing`] behind a blocking mutex
///
/// Typically placed in a `static` so the UART interrupt can reach it:
///
/// ```rust
/// use embassy_sync::blocking_mutex::raw::NoopRawMutex;
/// use esplink::ring::SharedRing;
///
/// let ring: SharedRing<NoopRawMutex, 16> = SharedRing::new();
/// ring.push(b'O');
/// ring.push(b'K');
/// assert!(ring.with(|r| r.matches_exact(b"OK")));
/// ```
pub struct SharedRing<M: RawMutex, const C: usize = RECEPTION_BUFFER_SIZE> {
    inner: Mutex<M, RefCell<ReceptionRing<C>>>,
}

impl<M: RawMutex, const C: usize> SharedRing<M, C> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(ReceptionRing::new())),
        }
    }

    /// Producer entry point: append one arrived byte
    pub fn push(&self, byte: u8) {
        self.with(|ring| ring.append(byte));
    }

    /// Append several arrived bytes in one critical section
    pub fn extend(&self, bytes: &[u8]) {
        self.with(|ring| bytes.iter().for_each(|&b| ring.append(b)));
    }

    /// Run `f` with exclusive access to the ring
    pub fn with<U>(&self, f: impl FnOnce(&mut ReceptionRing<C>) -> U) -> U {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<M: RawMutex, const C: usize> Default for SharedRing<M, C> {
    fn default() -> Self {
        Self::new()
    }
}
