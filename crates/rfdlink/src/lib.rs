// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rfdlink - RFD900 radio link test
//!
//! Measures frame loss across a pair of RFD900 modems running as a
//! transparent serial link. One end runs the **sender**, which writes a
//! numbered test frame every tick. The other end runs the **receiver**, which
//! resynchronizes on the byte stream, validates each frame and counts what
//! went missing.
//!
//! ## Wire format
//!
//! ```text
//! +--------+-----------+--------------------+-----------+
//! | 0xA5   | seq (BE)  | payload "abab..."  | CRC (BE)  |
//! | 1 byte | 2 bytes   | 40 bytes           | 2 bytes   |
//! +--------+-----------+--------------------+-----------+
//!            \______ CRC-16/CCITT-FALSE ___/
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`link`] | Byte transport: serial port or in-memory simulation |
//! | [`discover`] | RFD900 search through the AT command probe |
//! | [`frame`] | Encoding, decoding and stream resynchronization |
//! | [`session`] | Sequence gap accounting |
//! | [`role`] | Sender and receiver state machines |
//! | [`engine`] | Run loop, cancellation, final report |
//! | [`report`] | Statistics snapshots and their text rendering |
//!
//! ## Example
//!
//! ```rust
//! use rfdlink::{run, CancelToken, ReceiverRole, SenderRole, SerialLink, SimLink};
//! use std::time::Duration;
//!
//! let mut link = SimLink::perfect();
//! let mut sender = SenderRole::new(Duration::from_millis(100));
//! for _ in 0..5 {
//!     sender.on_tick(&mut link).unwrap();
//! }
//!
//! let mut receiver = ReceiverRole::new();
//! let mut buf = [0u8; 512];
//! let n = link.read_available(&mut buf).unwrap();
//! receiver.on_bytes(&buf[..n]);
//! assert_eq!(receiver.session().frames_received, 5);
//!
//! let cancel = CancelToken::new();
//! cancel.cancel();
//! let outcome = run(&mut receiver, &mut link, &cancel);
//! assert_eq!(outcome.exit_code(), 0);
//! ```

pub mod config;
pub mod crc;
pub mod discover;
pub mod engine;
pub mod frame;
pub mod link;
pub mod report;
pub mod role;
pub mod session;

pub use config::{ConfigError, LinkTestConfig, ReceiverConfig, SenderConfig, SerialConfig};
pub use crc::{crc16_ccitt, Crc16};
pub use discover::find_rfd900;
pub use engine::{run, run_with_progress, CancelToken, RunOutcome};
pub use frame::{
    decode_frame, encode_frame, Frame, FrameDecoder, FrameError, FRAME_LEN, FRAME_MARKER,
    PAYLOAD_LEN, SEQ_MODULUS, TEST_PATTERN,
};
pub use link::{ConnectionError, LinkStats, SerialLink, SerialPortLink, SimLink, SimLinkConfig};
pub use report::{ReceiverReport, Report, SenderReport};
pub use role::{build_role, LinkRole, ReceiverRole, Role, RoleState, SenderRole};
pub use session::{Arrival, SessionStats, MIN_SEQ_MODULUS};
