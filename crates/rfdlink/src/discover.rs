// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RFD900 auto-discovery.
//!
//! Only ports that look like USB serial adapters are touched; poking at
//! arbitrary system devices can upset them. Each candidate is asked to enter
//! AT command mode:
//!
//! ```text
//! <guard silence> "+++" <guard silence>  -> modem answers "OK"
//! "ATO\r"                                -> back to transparent mode
//! ```

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{SerialPortInfo, SerialPortType};

use super::config::SerialConfig;
use super::engine::CancelToken;
use super::link::{open_port, ConnectionError};

/// Lower-case substrings that mark a port as safe to probe.
pub const SAFE_DESCRIPTIONS: &[&str] = &["usb", "ch340", "arduino"];

const AT_ENTER: &[u8] = b"+++";
const AT_EXIT: &[u8] = b"ATO\r";
const AT_OK: &[u8] = b"OK";

/// Longest AT response we bother reading.
const MAX_RESPONSE: usize = 256;

/// Human-readable description of a port, lower-cased.
#[must_use]
pub fn describe(info: &SerialPortInfo) -> String {
    let details = match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut parts = vec!["usb".to_string()];
            parts.extend(usb.manufacturer.clone());
            parts.extend(usb.product.clone());
            parts.join(" ")
        }
        SerialPortType::PciPort => "pci".to_string(),
        SerialPortType::BluetoothPort => "bluetooth".to_string(),
        SerialPortType::Unknown => String::new(),
    };
    format!("{} {}", info.port_name, details)
        .trim()
        .to_lowercase()
}

/// Whether a description matches one of [`SAFE_DESCRIPTIONS`].
#[must_use]
pub fn is_safe_description(description: &str) -> bool {
    let description = description.to_lowercase();
    SAFE_DESCRIPTIONS.iter().any(|s| description.contains(s))
}

/// Serial ports worth probing, in enumeration order.
pub fn candidate_ports() -> Result<Vec<SerialPortInfo>, ConnectionError> {
    let ports = serialport::available_ports().map_err(ConnectionError::Enumerate)?;
    Ok(ports
        .into_iter()
        .filter(|p| is_safe_description(&describe(p)))
        .collect())
}

/// Ask whatever is behind `port` to enter AT command mode.
///
/// Returns `true` if the answer contains `OK`. Once `+++` has gone out the
/// port is put back into transparent mode either way. An interrupt during
/// either guard wait ends the probe with `false`.
pub fn probe_at_mode<P>(port: &mut P, guard: Duration, cancel: &CancelToken) -> io::Result<bool>
where
    P: Read + Write + ?Sized,
{
    if !cancel.sleep(guard) {
        return Ok(false);
    }
    port.write_all(AT_ENTER)?;
    port.flush()?;

    let settled = cancel.sleep(guard);
    let response = if settled {
        read_response(port)?
    } else {
        Vec::new()
    };

    port.write_all(AT_EXIT)?;
    port.flush()?;

    Ok(settled && response.windows(AT_OK.len()).any(|w| w == AT_OK))
}

fn read_response<P>(port: &mut P) -> io::Result<Vec<u8>>
where
    P: Read + ?Sized,
{
    let mut response = Vec::new();
    let mut chunk = [0u8; 64];
    while response.len() < MAX_RESPONSE {
        match port.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&chunk[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) =>
            {
                break
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(response)
}

/// Search the safe serial ports for an RFD900 and return its path.
///
/// `cancel` is checked before each candidate and during the AT guard waits;
/// an interrupt yields [`ConnectionError::Interrupted`].
pub fn find_rfd900(
    config: &SerialConfig,
    cancel: &CancelToken,
) -> Result<String, ConnectionError> {
    if cancel.is_cancelled() {
        return Err(ConnectionError::Interrupted);
    }
    let candidates = candidate_ports()?;
    if candidates.is_empty() {
        return Err(ConnectionError::NotFound("no serial device found".into()));
    }

    log::info!(
        "[DISCOVER] checking: {}",
        candidates
            .iter()
            .map(|p| p.port_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    for info in &candidates {
        if cancel.is_cancelled() {
            log::info!("[DISCOVER] interrupted");
            return Err(ConnectionError::Interrupted);
        }
        log::info!("[DISCOVER] testing {}...", info.port_name);
        let mut port = match open_port(&info.port_name, config.baud, config.read_timeout()) {
            Ok(port) => port,
            Err(e) => {
                log::debug!("[DISCOVER] {}", e);
                continue;
            }
        };

        match probe_at_mode(port.as_mut(), config.at_guard(), cancel) {
            Ok(true) => {
                log::info!("[DISCOVER] found RFD900 on {}", info.port_name);
                return Ok(info.port_name.clone());
            }
            Ok(false) => log::debug!("[DISCOVER] {} did not answer OK", info.port_name),
            Err(e) => log::debug!("[DISCOVER] probing {} failed: {}", info.port_name, e),
        }
    }

    if cancel.is_cancelled() {
        return Err(ConnectionError::Interrupted);
    }
    Err(ConnectionError::NotFound(format!(
        "{} candidate port(s) did not answer the AT probe",
        candidates.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Port that replays a canned response and records what was written.
    struct ScriptedPort {
        response: VecDeque<u8>,
        written: Vec<u8>,
        fail_reads: bool,
    }

    impl ScriptedPort {
        fn answering(response: &[u8]) -> Self {
            Self {
                response: response.iter().copied().collect(),
                written: Vec::new(),
                fail_reads: false,
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            if self.response.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
            }
            let n = buf.len().min(self.response.len()).min(3);
            for slot in buf.iter_mut().take(n) {
                *slot = self.response.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_probe_detects_modem() {
        let mut port = ScriptedPort::answering(b"+++OK\r\n");
        assert!(probe_at_mode(&mut port, Duration::ZERO, &CancelToken::new()).expect("probe"));
        assert_eq!(port.written, b"+++ATO\r");
    }

    #[test]
    fn test_probe_rejects_silent_device() {
        let mut port = ScriptedPort::answering(b"");
        assert!(!probe_at_mode(&mut port, Duration::ZERO, &CancelToken::new()).expect("probe"));
        // Still leaves AT mode in case the modem answered late.
        assert!(port.written.ends_with(AT_EXIT));
    }

    #[test]
    fn test_probe_rejects_other_device() {
        let mut port = ScriptedPort::answering(b"BONJOUR\r\n");
        assert!(!probe_at_mode(&mut port, Duration::ZERO, &CancelToken::new()).expect("probe"));
    }

    #[test]
    fn test_probe_propagates_io_error() {
        let mut port = ScriptedPort::answering(b"");
        port.fail_reads = true;
        assert!(probe_at_mode(&mut port, Duration::ZERO, &CancelToken::new()).is_err());
    }

    #[test]
    fn test_safe_descriptions() {
        assert!(is_safe_description("/dev/ttyUSB0"));
        assert!(is_safe_description("com4 usb ftdi ft231x usb uart"));
        assert!(is_safe_description("USB-SERIAL CH340"));
        assert!(is_safe_description("Arduino Uno"));
        assert!(!is_safe_description("/dev/ttyS0"));
        assert!(!is_safe_description("bluetooth incoming port"));
    }

    #[test]
    fn test_describe_unknown_port() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyUSB0".into(),
            port_type: SerialPortType::Unknown,
        };
        assert_eq!(describe(&info), "/dev/ttyusb0");
        assert!(is_safe_description(&describe(&info)));

        let pci = SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::PciPort,
        };
        assert!(!is_safe_description(&describe(&pci)));
    }

    #[test]
    fn test_probe_interrupted_before_escape() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut port = ScriptedPort::answering(b"OK\r\n");

        let start = std::time::Instant::now();
        assert!(!probe_at_mode(&mut port, Duration::from_secs(60), &cancel).expect("probe"));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(port.written.is_empty());
    }

    #[test]
    fn test_find_interrupted_before_enumeration() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = find_rfd900(&SerialConfig::default(), &cancel);
        assert!(matches!(result, Err(ConnectionError::Interrupted)));
    }
}
