// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sender and receiver state machines.
//!
//! Both roles implement [`LinkRole`] and go through the same two states:
//!
//! ```text
//! Running --(interrupt or transport failure)--> Terminated
//! ```
//!
//! The role is chosen once at startup; the engine loop never branches on it.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use super::engine::CancelToken;
use super::frame::{Frame, FrameDecoder, FRAME_LEN, SEQ_MODULUS};
use super::link::{ConnectionError, SerialLink};
use super::report::{ReceiverReport, Report, SenderReport};
use super::session::{Arrival, SessionStats, MIN_SEQ_MODULUS};

/// Size of one receiver read.
pub const READ_CHUNK: usize = 2048;

/// Which end of the link this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sender,
    Receiver,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sender" => Ok(Role::Sender),
            "receiver" => Ok(Role::Receiver),
            _ => Err(format!("unknown role '{}' (expected 'sender' or 'receiver')", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => write!(f, "sender"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Lifecycle of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    Running,
    Terminated,
}

/// Capability shared by both roles.
pub trait LinkRole {
    fn role(&self) -> Role;

    fn state(&self) -> RoleState;

    /// Do one unit of work: wait for and emit one tick (sender) or perform
    /// one timed read and process the frames it completes (receiver).
    ///
    /// Returns early, without error, once `cancel` is set.
    fn poll(&mut self, link: &mut dyn SerialLink, cancel: &CancelToken)
        -> Result<(), ConnectionError>;

    /// Current statistics.
    fn snapshot(&self) -> Report;

    /// Enter `Terminated` and return the final statistics.
    fn on_terminate(&mut self) -> Report;
}

/// Build the role selected at startup.
pub fn build_role(role: Role, tick_interval: Duration) -> Box<dyn LinkRole> {
    match role {
        Role::Sender => Box::new(SenderRole::new(tick_interval)),
        Role::Receiver => Box::new(ReceiverRole::new()),
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Emits one test frame per tick, fire and forget.
pub struct SenderRole {
    interval: Duration,
    modulus: u32,
    next_seq: u32,
    next_tick: Option<Instant>,
    frames_sent: u64,
    bytes_sent: u64,
    last_sequence: Option<u16>,
    started: Instant,
    state: RoleState,
}

impl SenderRole {
    pub fn new(interval: Duration) -> Self {
        Self::with_modulus(interval, SEQ_MODULUS)
    }

    /// Sender whose sequence numbers wrap at `modulus`, clamped to
    /// `MIN_SEQ_MODULUS..=SEQ_MODULUS` like the receiver's session.
    pub fn with_modulus(interval: Duration, modulus: u32) -> Self {
        Self {
            interval,
            modulus: modulus.clamp(MIN_SEQ_MODULUS, SEQ_MODULUS),
            next_seq: 0,
            next_tick: None,
            frames_sent: 0,
            bytes_sent: 0,
            last_sequence: None,
            started: Instant::now(),
            state: RoleState::Running,
        }
    }

    /// Sequence number the next tick will carry.
    pub fn next_sequence(&self) -> u16 {
        self.next_seq as u16
    }

    /// Encode and write the next frame. Returns its sequence number.
    pub fn on_tick(&mut self, link: &mut dyn SerialLink) -> Result<u16, ConnectionError> {
        let seq = self.next_seq as u16;
        let bytes = Frame::test_pattern(seq).to_bytes();
        link.write_all(&bytes)?;
        log::trace!("[SENDER] frame {} sent", seq);

        self.frames_sent += 1;
        self.bytes_sent += FRAME_LEN as u64;
        self.last_sequence = Some(seq);
        self.next_seq = (self.next_seq + 1) % self.modulus;
        Ok(seq)
    }
}

impl LinkRole for SenderRole {
    fn role(&self) -> Role {
        Role::Sender
    }

    fn state(&self) -> RoleState {
        self.state
    }

    fn poll(
        &mut self,
        link: &mut dyn SerialLink,
        cancel: &CancelToken,
    ) -> Result<(), ConnectionError> {
        let now = Instant::now();
        let deadline = *self.next_tick.get_or_insert(now);
        if !cancel.sleep_until(deadline) {
            return Ok(());
        }

        self.on_tick(link)?;

        // Fixed schedule; if we fell behind by a whole period, restart from now.
        let next = deadline + self.interval;
        self.next_tick = Some(if next < Instant::now() {
            Instant::now() + self.interval
        } else {
            next
        });
        Ok(())
    }

    fn snapshot(&self) -> Report {
        Report::Sender(SenderReport {
            frames_sent: self.frames_sent,
            bytes_sent: self.bytes_sent,
            last_sequence: self.last_sequence,
            elapsed: self.started.elapsed(),
        })
    }

    fn on_terminate(&mut self) -> Report {
        if self.state == RoleState::Running {
            log::info!("[SENDER] stopped after {} frames", self.frames_sent);
        }
        self.state = RoleState::Terminated;
        self.snapshot()
    }
}

// ============================================================================
// Receiver
// ============================================================================

/// Consumes frames and keeps the session statistics.
pub struct ReceiverRole {
    decoder: FrameDecoder,
    session: SessionStats,
    read_buf: Vec<u8>,
    bytes_received: u64,
    started: Instant,
    state: RoleState,
}

impl Default for ReceiverRole {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverRole {
    pub fn new() -> Self {
        Self::with_session(SessionStats::new())
    }

    /// Receiver starting from the given (usually empty) session.
    pub fn with_session(session: SessionStats) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            session,
            read_buf: vec![0u8; READ_CHUNK],
            bytes_received: 0,
            started: Instant::now(),
            state: RoleState::Running,
        }
    }

    pub fn session(&self) -> &SessionStats {
        &self.session
    }

    /// Account for one validated frame.
    pub fn on_frame(&mut self, frame: &Frame) -> Arrival {
        if !frame.has_test_pattern() {
            self.session.payload_errors += 1;
        }

        let arrival = self.session.record(u32::from(frame.seq));
        match arrival {
            Arrival::Gap { missed } => {
                log::debug!("[RECEIVER] frame {} ({} missed)", frame.seq, missed);
            }
            Arrival::Duplicate | Arrival::OutOfOrder => {
                log::debug!("[RECEIVER] frame {} {:?}", frame.seq, arrival);
            }
            Arrival::First | Arrival::InOrder => {
                log::debug!("[RECEIVER] frame {}", frame.seq);
            }
        }
        arrival
    }

    /// Feed raw bytes, processing every frame they complete.
    pub fn on_bytes(&mut self, bytes: &[u8]) -> usize {
        self.bytes_received += bytes.len() as u64;
        self.decoder.push(bytes);

        let mut count = 0;
        while let Some(frame) = self.decoder.next_frame() {
            self.on_frame(&frame);
            count += 1;
        }
        count
    }
}

impl LinkRole for ReceiverRole {
    fn role(&self) -> Role {
        Role::Receiver
    }

    fn state(&self) -> RoleState {
        self.state
    }

    fn poll(
        &mut self,
        link: &mut dyn SerialLink,
        cancel: &CancelToken,
    ) -> Result<(), ConnectionError> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let n = link.read_available(&mut self.read_buf)?;
        if n > 0 {
            let chunk = std::mem::take(&mut self.read_buf);
            self.on_bytes(&chunk[..n]);
            self.read_buf = chunk;
        }
        Ok(())
    }

    fn snapshot(&self) -> Report {
        let decoder = self.decoder.stats();
        Report::Receiver(ReceiverReport {
            frames_received: self.session.frames_received,
            frames_missed: self.session.frames_missed,
            frames_expected: self.session.frames_expected(),
            duplicates: self.session.duplicates,
            out_of_order: self.session.out_of_order,
            payload_errors: self.session.payload_errors,
            corrupt_frames: decoder.crc_failures,
            bytes_discarded: decoder.bytes_discarded,
            bytes_received: self.bytes_received,
            first_sequence: self.session.first_sequence,
            last_sequence: self.session.last_sequence,
            elapsed: self.started.elapsed(),
        })
    }

    fn on_terminate(&mut self) -> Report {
        if self.state == RoleState::Running {
            log::info!(
                "[RECEIVER] stopped: {} received, {} missed",
                self.session.frames_received,
                self.session.frames_missed
            );
            let decoder = self.decoder.stats();
            if decoder.crc_failures > 0 {
                log::warn!(
                    "[RECEIVER] {} corrupt frame(s) rejected, {} byte(s) discarded",
                    decoder.crc_failures,
                    decoder.bytes_discarded
                );
            }
        }
        self.state = RoleState::Terminated;
        self.snapshot()
    }
}
