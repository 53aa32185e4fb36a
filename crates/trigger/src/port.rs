//! Byte-oriented command channel to the trigger hardware.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use trigcam_common::config::TriggerConfig;
use trigcam_common::error::{TrigcamError, TrigcamResult};

/// Anything that reads and writes trigger command bytes.
pub trait TriggerPort: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> TriggerPort for T {}

/// Opens the command channel for a session.
pub trait TriggerConnector: Send + Sync {
    fn connect(&self, config: &TriggerConfig) -> TrigcamResult<Box<dyn TriggerPort>>;
}

/// Opens the configured serial device.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

const READ_TIMEOUT: Duration = Duration::from_secs(1);

impl TriggerConnector for SerialConnector {
    fn connect(&self, config: &TriggerConfig) -> TrigcamResult<Box<dyn TriggerPort>> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                TrigcamError::trigger(format!("cannot open serial device {}: {e}", config.port))
            })?;
        tracing::info!(port = %config.port, baud = config.baud_rate, "Trigger port opened");
        Ok(Box::new(port))
    }
}

/// Write one complete command and flush it to the device.
pub fn send_command(port: &mut dyn TriggerPort, command: &[u8]) -> TrigcamResult<()> {
    port.write_all(command)
        .and_then(|_| port.flush())
        .map_err(|e| {
            TrigcamError::trigger(format!(
                "failed to send {:?}: {e}",
                String::from_utf8_lossy(command)
            ))
        })
}

/// Wait for the device to answer, then read up to `max_len` bytes.
///
/// A read timeout yields whatever arrived so far (possibly nothing).
pub fn read_response(
    port: &mut dyn TriggerPort,
    settle: Duration,
    max_len: usize,
) -> TrigcamResult<Vec<u8>> {
    std::thread::sleep(settle);
    let mut buf = vec![0u8; max_len];
    match port.read(&mut buf) {
        Ok(n) => {
            buf.truncate(n);
            Ok(buf)
        }
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            Ok(Vec::new())
        }
        Err(e) => Err(TrigcamError::trigger(format!("failed to read response: {e}"))),
    }
}

/// Strip line endings, other control characters, and `>` prompt markers.
pub fn normalize_response(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| !c.is_control() && *c != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_prompt_and_line_endings() {
        assert_eq!(normalize_response(b"ver\r\n>v2.1\r\n>"), "verv2.1");
        assert_eq!(normalize_response(b"\r\n>pong\r\n>"), "pong");
        assert_eq!(normalize_response(b""), "");
    }

    #[test]
    fn send_command_writes_bytes() {
        let mut sink = std::io::Cursor::new(Vec::new());
        send_command(&mut sink, b"Q\r").unwrap();
        assert_eq!(sink.into_inner(), b"Q\r");
    }
}
