// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-stream transport over the radio modem's serial port.
//!
//! The RFD900 runs as a transparent serial link: whatever is written to the
//! local port comes out of the remote one, with no framing of its own. A
//! [`SerialLink`] therefore moves raw bytes; frame boundaries are recovered by
//! [`FrameDecoder`](crate::frame::FrameDecoder).
//!
//! # Implementations
//!
//! - [`SerialPortLink`] - a real serial device (`/dev/ttyUSB0`, `COM4`, ...)
//! - [`SimLink`] - in-memory pipe with loss/corruption/disconnect injection
//!
//! Links never retry. Every failure surfaces as a [`ConnectionError`] and is
//! fatal for the running role.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;

use super::config::SerialConfig;

/// Transport failure. Always fatal for the current role.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial port enumeration failed: {0}")]
    Enumerate(#[source] serialport::Error),

    #[error("no RFD900 modem found: {0}")]
    NotFound(String),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("link is closed")]
    Closed,

    #[error("interrupted")]
    Interrupted,
}

/// Link counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Successful `write_all` calls.
    pub writes: u64,
    /// Reads that returned at least one byte.
    pub reads: u64,
    /// Reads that timed out or were interrupted with nothing received.
    pub empty_reads: u64,
    /// Writes swallowed by a simulated link.
    pub writes_dropped: u64,
    /// Bytes altered by a simulated link.
    pub bytes_corrupted: u64,
}

/// Byte transport used by both roles.
pub trait SerialLink {
    /// Write every byte or fail.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ConnectionError>;

    /// Read whatever is available into `buf`.
    ///
    /// Blocks for at most the link's read timeout. Returns `Ok(0)` when
    /// nothing arrived in time or when a signal interrupted the wait.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError>;

    /// Release the underlying handle. Idempotent.
    fn close(&mut self);

    /// Human-readable link name for log messages.
    fn name(&self) -> &str;

    fn stats(&self) -> LinkStats {
        LinkStats::default()
    }
}

// ============================================================================
// SerialPortLink - physical serial device
// ============================================================================

/// Serial device opened through the `serialport` crate.
///
/// The port is closed by [`close`](SerialLink::close) or, failing that, on drop.
pub struct SerialPortLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    stats: LinkStats,
}

impl SerialPortLink {
    /// Open `path` with the baud rate and read timeout from `config`.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, ConnectionError> {
        let port = open_port(path, config.baud, config.read_timeout())?;
        log::info!(
            "[LINK] serial connection opened ({} @ {} baud)",
            path,
            config.baud
        );
        Ok(Self {
            name: path.to_string(),
            port: Some(port),
            stats: LinkStats::default(),
        })
    }
}

/// Open a raw port: 8N1, no flow control, both buffers flushed.
pub(crate) fn open_port(
    path: &str,
    baud: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, ConnectionError> {
    let open_err = |source| ConnectionError::Open {
        port: path.to_string(),
        source,
    };

    let port = serialport::new(path, baud)
        .timeout(timeout)
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(open_err)?;
    port.clear(ClearBuffer::All).map_err(open_err)?;
    Ok(port)
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let port = self.port.as_mut().ok_or(ConnectionError::Closed)?;
        port.write_all(bytes).map_err(ConnectionError::Write)?;
        port.flush().map_err(ConnectionError::Write)?;
        self.stats.writes += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let port = self.port.as_mut().ok_or(ConnectionError::Closed)?;
        match port.read(buf) {
            Ok(n) => {
                if n == 0 {
                    self.stats.empty_reads += 1;
                } else {
                    self.stats.reads += 1;
                    self.stats.bytes_received += n as u64;
                }
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                self.stats.empty_reads += 1;
                Ok(0)
            }
            Err(e) => Err(ConnectionError::Read(e)),
        }
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            if let Err(e) = port.clear(ClearBuffer::All) {
                log::debug!("[LINK] clearing buffers on close failed: {}", e);
            }
            drop(port);
            log::info!("[LINK] serial connection closed ({})", self.name);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> LinkStats {
        self.stats.clone()
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// SimLink - in-memory link with impairments
// ============================================================================

/// Impairments applied by [`SimLink`].
#[derive(Debug, Clone)]
pub struct SimLinkConfig {
    /// Probability that a whole `write_all` is lost (0.0 - 1.0).
    pub loss_rate: f64,
    /// Per-byte probability of a single bit flip (0.0 - 1.0).
    pub corruption_rate: f64,
    /// Fail every read after this many reads have been served.
    pub disconnect_after_reads: Option<u64>,
    /// Largest chunk handed out by one read.
    pub max_read: usize,
}

impl Default for SimLinkConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
            disconnect_after_reads: None,
            max_read: usize::MAX,
        }
    }
}

impl SimLinkConfig {
    /// Lossy link, no corruption.
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            ..Default::default()
        }
    }

    /// Roughly what a long-range RFD900 hop looks like near the edge of range.
    pub fn marginal_radio() -> Self {
        Self {
            loss_rate: 0.10,
            corruption_rate: 0.001,
            disconnect_after_reads: None,
            max_read: 64,
        }
    }
}

/// Loopback byte pipe: what is written is what is read, minus impairments.
///
/// Useful for running a sender and a receiver against each other without
/// hardware. Reads never block; an empty pipe yields `Ok(0)`.
pub struct SimLink {
    config: SimLinkConfig,
    queue: VecDeque<u8>,
    rng_state: u64,
    reads_served: u64,
    closed: bool,
    stats: LinkStats,
}

impl SimLink {
    pub fn new(config: SimLinkConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            rng_state: 0x12345678_9ABCDEF0,
            reads_served: 0,
            closed: false,
            stats: LinkStats::default(),
        }
    }

    /// No impairments.
    pub fn perfect() -> Self {
        Self::new(SimLinkConfig::default())
    }

    /// Set the PRNG seed for reproducible runs.
    pub fn set_seed(&mut self, seed: u64) {
        // xorshift has a fixed point at zero
        self.rng_state = seed.max(1);
    }

    /// Bytes written but not read yet.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn config(&self) -> &SimLinkConfig {
        &self.config
    }

    fn rand_u64(&mut self) -> u64 {
        // xorshift64
        let mut state = self.rng_state;
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        self.rng_state = state;
        state
    }

    fn rand_f64(&mut self) -> f64 {
        (self.rand_u64() as f64) / (u64::MAX as f64)
    }
}

impl SerialLink for SimLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        self.stats.writes += 1;
        self.stats.bytes_sent += bytes.len() as u64;

        if self.config.loss_rate > 0.0 && self.rand_f64() < self.config.loss_rate {
            self.stats.writes_dropped += 1;
            return Ok(());
        }

        for &byte in bytes {
            let mut byte = byte;
            if self.config.corruption_rate > 0.0 && self.rand_f64() < self.config.corruption_rate {
                byte ^= 1 << (self.rand_u64() % 8);
                self.stats.bytes_corrupted += 1;
            }
            self.queue.push_back(byte);
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        if let Some(limit) = self.config.disconnect_after_reads {
            if self.reads_served >= limit {
                return Err(ConnectionError::Read(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "simulated disconnect",
                )));
            }
        }
        self.reads_served += 1;

        let n = buf.len().min(self.queue.len()).min(self.config.max_read);
        for (slot, byte) in buf.iter_mut().zip(self.queue.drain(..n)) {
            *slot = byte;
        }

        if n == 0 {
            self.stats.empty_reads += 1;
        } else {
            self.stats.reads += 1;
            self.stats.bytes_received += n as u64;
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        "sim"
    }

    fn stats(&self) -> LinkStats {
        self.stats.clone()
    }
}
