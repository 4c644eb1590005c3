// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read-only statistics snapshots handed to whoever prints them.

use std::fmt;
use std::time::Duration;

use super::role::Role;

/// Snapshot of a sender session.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderReport {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Sequence number of the last frame written.
    pub last_sequence: Option<u16>,
    pub elapsed: Duration,
}

impl SenderReport {
    /// Average outgoing rate in bits per second.
    #[must_use]
    pub fn bit_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes_sent * 8) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Snapshot of a receiver session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverReport {
    pub frames_received: u64,
    pub frames_missed: u64,
    pub frames_expected: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub payload_errors: u64,
    /// Candidate frames rejected by the CRC.
    pub corrupt_frames: u64,
    /// Noise bytes skipped while resynchronizing.
    pub bytes_discarded: u64,
    pub bytes_received: u64,
    pub first_sequence: Option<u32>,
    pub last_sequence: Option<u32>,
    pub elapsed: Duration,
}

impl ReceiverReport {
    /// `missed / (received + missed)`, 0 before the first frame.
    #[must_use]
    pub fn loss_ratio(&self) -> f64 {
        let total = self.frames_received + self.frames_missed;
        if total == 0 {
            0.0
        } else {
            self.frames_missed as f64 / total as f64
        }
    }

    #[must_use]
    pub fn loss_percent(&self) -> f64 {
        self.loss_ratio() * 100.0
    }
}

/// Statistics for either role.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Sender(SenderReport),
    Receiver(ReceiverReport),
}

impl Report {
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Self::Sender(_) => Role::Sender,
            Self::Receiver(_) => Role::Receiver,
        }
    }

    #[must_use]
    pub fn as_receiver(&self) -> Option<&ReceiverReport> {
        match self {
            Self::Receiver(r) => Some(r),
            Self::Sender(_) => None,
        }
    }

    #[must_use]
    pub fn as_sender(&self) -> Option<&SenderReport> {
        match self {
            Self::Sender(s) => Some(s),
            Self::Receiver(_) => None,
        }
    }
}

impl fmt::Display for SenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of sent frames : {}", self.frames_sent)?;
        writeln!(f, "Bytes sent : {}", self.bytes_sent)?;
        if let Some(seq) = self.last_sequence {
            writeln!(f, "Last sequence number : {}", seq)?;
        }
        write!(
            f,
            "Duration : {:.1}s ({:.0} bit/s)",
            self.elapsed.as_secs_f64(),
            self.bit_rate()
        )
    }
}

impl fmt::Display for ReceiverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of received frames : {}", self.frames_received)?;
        writeln!(
            f,
            "Number of missed frames : {} ({:.2}% loss)",
            self.frames_missed,
            self.loss_percent()
        )?;
        writeln!(f, "Duplicate frames : {}", self.duplicates)?;
        writeln!(f, "Out-of-order frames : {}", self.out_of_order)?;
        writeln!(f, "Payload errors : {}", self.payload_errors)?;
        writeln!(f, "Corrupt frames discarded : {}", self.corrupt_frames)?;
        write!(f, "Duration : {:.1}s", self.elapsed.as_secs_f64())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender(s) => s.fmt(f),
            Self::Receiver(r) => r.fmt(f),
        }
    }
}
