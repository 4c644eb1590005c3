// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver-side sequence accounting.
//!
//! Every validated frame goes through [`SessionStats::record`], which compares
//! its sequence number with the last accepted one modulo the sequence space:
//!
//! ```text
//! g = (seq - last) mod modulus
//!
//! g == 0               duplicate            counted, last unchanged
//! 1 <= g < modulus/2   forward              received += 1, missed += g - 1, last = seq
//! g >= modulus/2       behind (stale)       counted, last unchanged
//! ```
//!
//! Loss before the first received frame is unmeasurable and never counted.
//! The half-modulus split means a burst of more than `modulus/2 - 1` lost
//! frames is indistinguishable from a stale frame.

use super::frame::SEQ_MODULUS;

/// Smallest sequence space with a non-empty forward window.
pub const MIN_SEQ_MODULUS: u32 = 4;

/// How an incoming sequence number was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// First frame of the session, used as the baseline.
    First,
    /// Exactly the next expected sequence number.
    InOrder,
    /// Forward jump; `missed` frames presumed lost.
    Gap { missed: u32 },
    /// Same sequence number as the last accepted frame.
    Duplicate,
    /// Sequence number behind the last accepted one.
    OutOfOrder,
}

/// Receiver session counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    modulus: u32,
    /// Frames accepted under the forward interpretation (first frame included).
    pub frames_received: u64,
    /// Frames inferred lost from forward gaps.
    pub frames_missed: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    /// CRC-valid frames whose payload is not the test pattern.
    pub payload_errors: u64,
    pub first_sequence: Option<u32>,
    pub last_sequence: Option<u32>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::with_modulus(SEQ_MODULUS)
    }
}

impl SessionStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for a sequence space wrapping at `modulus`, clamped to
    /// `MIN_SEQ_MODULUS..=SEQ_MODULUS`.
    #[must_use]
    pub fn with_modulus(modulus: u32) -> Self {
        Self {
            modulus: modulus.clamp(MIN_SEQ_MODULUS, SEQ_MODULUS),
            frames_received: 0,
            frames_missed: 0,
            duplicates: 0,
            out_of_order: 0,
            payload_errors: 0,
            first_sequence: None,
            last_sequence: None,
        }
    }

    #[must_use]
    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    /// Account for one received sequence number.
    pub fn record(&mut self, seq: u32) -> Arrival {
        let seq = seq % self.modulus;

        let Some(last) = self.last_sequence else {
            self.first_sequence = Some(seq);
            self.last_sequence = Some(seq);
            self.frames_received = 1;
            return Arrival::First;
        };

        let modulus = u64::from(self.modulus);
        let gap = ((u64::from(seq) + modulus - u64::from(last)) % modulus) as u32;
        if gap == 0 {
            self.duplicates += 1;
            return Arrival::Duplicate;
        }
        if gap >= self.modulus / 2 {
            self.out_of_order += 1;
            return Arrival::OutOfOrder;
        }

        self.frames_received += 1;
        self.last_sequence = Some(seq);
        if gap == 1 {
            Arrival::InOrder
        } else {
            let missed = gap - 1;
            self.frames_missed += u64::from(missed);
            Arrival::Gap { missed }
        }
    }

    /// Frames the sender emitted between the first and last accepted ones.
    #[must_use]
    pub fn frames_expected(&self) -> u64 {
        self.frames_received + self.frames_missed
    }

    /// `missed / (received + missed)`, or 0 before any frame.
    #[must_use]
    pub fn loss_ratio(&self) -> f64 {
        let expected = self.frames_expected();
        if expected == 0 {
            0.0
        } else {
            self.frames_missed as f64 / expected as f64
        }
    }
}
