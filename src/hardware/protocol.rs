//! Newline-delimited ASCII protocol spoken with the roaster controller board.
//!
//! Host requests:
//! - `READ TEMP`            -> `TEMP <int>`
//! - `READ STATUS`          -> `STATUS OK` | `STATUS FAULT`
//! - `SET POWER <0-100>`    -> `ok` | `error <msg>`
//! - `SET IGNITER <0|1>`    -> `ok` | `error <msg>`
//! - `SET FAN <n>`          -> `ok` | `error <msg>`

use roastero_shared::HardwareError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    ReadTemp,
    ReadStatus,
    SetPower(u8),
    SetIgniter(bool),
    SetFan(u8),
}

impl Request {
    pub fn encode(&self) -> String {
        match self {
            Request::ReadTemp => "READ TEMP\n".to_string(),
            Request::ReadStatus => "READ STATUS\n".to_string(),
            Request::SetPower(level) => format!("SET POWER {}\n", (*level).min(100)),
            Request::SetIgniter(on) => format!("SET IGNITER {}\n", if *on { 1 } else { 0 }),
            Request::SetFan(speed) => format!("SET FAN {}\n", speed),
        }
    }
}

pub fn parse_temperature(line: &str) -> Result<i32, HardwareError> {
    let value = line
        .trim()
        .strip_prefix("TEMP ")
        .ok_or_else(|| HardwareError::Protocol(format!("expected TEMP, got '{}'", line.trim())))?;
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| HardwareError::Protocol(format!("invalid temperature '{}'", value.trim())))
}

pub fn parse_status(line: &str) -> Result<bool, HardwareError> {
    match line.trim() {
        "STATUS OK" => Ok(true),
        "STATUS FAULT" => Ok(false),
        other => Err(HardwareError::Protocol(format!("expected STATUS, got '{}'", other))),
    }
}

pub fn parse_ack(line: &str) -> Result<(), HardwareError> {
    let line = line.trim();
    if line == "ok" {
        Ok(())
    } else if let Some(msg) = line.strip_prefix("error") {
        Err(HardwareError::Rejected(msg.trim().to_string()))
    } else {
        Err(HardwareError::Protocol(format!("expected ack, got '{}'", line)))
    }
}

/// Accumulates raw serial bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

/// A line that never terminates is treated as garbage past this size.
const MAX_LINE: usize = 256;

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_LINE && !self.pending.contains(&b'\n') {
            tracing::warn!("Discarding {} bytes of unterminated serial input", self.pending.len());
            self.pending.clear();
        }
    }

    /// Pop the next non-empty line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_requests() {
        assert_eq!(Request::ReadTemp.encode(), "READ TEMP\n");
        assert_eq!(Request::SetPower(42).encode(), "SET POWER 42\n");
        assert_eq!(Request::SetPower(250).encode(), "SET POWER 100\n");
        assert_eq!(Request::SetIgniter(true).encode(), "SET IGNITER 1\n");
        assert_eq!(Request::SetFan(9).encode(), "SET FAN 9\n");
    }

    #[test]
    fn test_parse_responses() {
        assert_eq!(parse_temperature("TEMP 372\r").unwrap(), 372);
        assert_eq!(parse_temperature("TEMP -4").unwrap(), -4);
        assert!(matches!(parse_temperature("TEMP hot"), Err(HardwareError::Protocol(_))));
        assert!(matches!(parse_temperature("ok"), Err(HardwareError::Protocol(_))));
        assert!(parse_status("STATUS OK").unwrap());
        assert!(!parse_status("STATUS FAULT").unwrap());
        assert!(parse_status("STATUS ?").is_err());
        assert!(parse_ack("ok\n").is_ok());
        assert!(matches!(parse_ack("error overtemp"), Err(HardwareError::Rejected(m)) if m == "overtemp"));
    }

    #[test]
    fn test_line_buffer_splits_partial_reads() {
        let mut buf = LineBuffer::new();
        buf.extend(b"TEMP 3");
        assert_eq!(buf.next_line(), None);
        buf.extend(b"72\r\n\nSTATUS OK\nok");
        assert_eq!(buf.next_line().as_deref(), Some("TEMP 372"));
        assert_eq!(buf.next_line().as_deref(), Some("STATUS OK"));
        assert_eq!(buf.next_line(), None);
        buf.extend(b"\n");
        assert_eq!(buf.next_line().as_deref(), Some("ok"));
    }

    #[test]
    fn test_line_buffer_drops_runaway_input() {
        let mut buf = LineBuffer::new();
        buf.extend(&[b'x'; 300]);
        buf.extend(b"ok\n");
        assert_eq!(buf.next_line().as_deref(), Some("ok"));
    }
}
