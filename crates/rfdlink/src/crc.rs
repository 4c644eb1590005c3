// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CRC-16/CCITT-FALSE integrity check for test frames.
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | Polynomial | 0x1021 |
//! | Init | 0xFFFF |
//! | RefIn / RefOut | false |
//! | XorOut | 0x0000 |
//!
//! ```
//! use rfdlink::crc::crc16_ccitt;
//!
//! assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
//! ```

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Byte-wise lookup table, built at compile time.
const TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Incremental CRC-16 digest.
///
/// Frames are checksummed over `seq || payload` without first copying the two
/// fields into one buffer.
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    state: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    #[must_use]
    pub const fn new() -> Self {
        Self { state: INIT }
    }

    /// Feed more bytes into the digest.
    #[inline]
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        for &byte in data {
            let index = ((self.state >> 8) ^ u16::from(byte)) as usize;
            self.state = (self.state << 8) ^ TABLE[index];
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn finish(&self) -> u16 {
        self.state
    }
}

/// One-shot CRC-16/CCITT-FALSE.
#[inline]
#[must_use]
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    Crc16::new().update(data).finish()
}
