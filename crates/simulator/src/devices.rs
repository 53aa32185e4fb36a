//! Simulated serial trigger devices.
//!
//! Both devices speak the real command protocol over an in-memory byte
//! channel and drive a [`PulseLine`].

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use trigcam_common::clock::sleep_until;

use crate::pulse::PulseLine;

const PROMPT: &str = "\n\r>";

/// Every command a simulated device received, in order.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CommandLog {
    pub fn push(&self, command: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Splits incoming bytes into `\r`-terminated commands.
#[derive(Debug, Default)]
struct CommandBuffer {
    partial: Vec<u8>,
}

impl CommandBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut complete = Vec::new();
        for &b in bytes {
            if b == b'\r' {
                let command = String::from_utf8_lossy(&self.partial).trim().to_string();
                self.partial.clear();
                if !command.is_empty() {
                    complete.push(command);
                }
            } else {
                self.partial.push(b);
            }
        }
        complete
    }
}

fn read_pending(pending: &mut VecDeque<u8>, buf: &mut [u8]) -> io::Result<usize> {
    if pending.is_empty() {
        return Err(io::Error::new(ErrorKind::TimedOut, "no response pending"));
    }
    let n = buf.len().min(pending.len());
    for (slot, byte) in buf.iter_mut().zip(pending.drain(..n)) {
        *slot = byte;
    }
    Ok(n)
}

/// A USB GPIO module: `gpio set N`, `gpio clear N`, `ver`.
///
/// Echoes each command like the real firmware and answers after a prompt.
#[derive(Debug)]
pub struct SimulatedGpioModule {
    line: PulseLine,
    pin: u8,
    buffer: CommandBuffer,
    pending: VecDeque<u8>,
    log: CommandLog,
}

impl SimulatedGpioModule {
    pub fn new(line: PulseLine, pin: u8, log: CommandLog) -> Self {
        Self {
            line,
            pin,
            buffer: CommandBuffer::default(),
            pending: VecDeque::new(),
            log,
        }
    }

    fn execute(&mut self, command: &str) {
        self.log.push(command);
        let mut words = command.split_whitespace();
        let reply = match (words.next(), words.next(), words.next()) {
            (Some("gpio"), Some(action), Some(pin)) if pin.parse::<u8>().ok() == Some(self.pin) => {
                match action {
                    "set" => self.line.set_level(true),
                    "clear" => self.line.set_level(false),
                    _ => tracing::warn!(command, "Unknown GPIO action"),
                }
                None
            }
            (Some("gpio"), ..) => None,
            (Some("ver"), None, None) => Some("00000008".to_string()),
            _ => {
                tracing::warn!(command, "GPIO module ignored command");
                None
            }
        };
        self.pending.extend(command.as_bytes());
        if let Some(reply) = reply {
            self.pending.extend(PROMPT.as_bytes());
            self.pending.extend(reply.as_bytes());
        }
        self.pending.extend(PROMPT.as_bytes());
    }
}

impl Read for SimulatedGpioModule {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_pending(&mut self.pending, buf)
    }
}

impl Write for SimulatedGpioModule {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for command in self.buffer.push(buf) {
            self.execute(&command);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A microcontroller that free-runs the pulse after `S<fps>` until `Q`.
#[derive(Debug)]
pub struct SimulatedArduino {
    line: PulseLine,
    buffer: CommandBuffer,
    pending: VecDeque<u8>,
    log: CommandLog,
    stop_flag: Arc<AtomicBool>,
    pulser: Option<JoinHandle<()>>,
}

impl SimulatedArduino {
    pub fn new(line: PulseLine, log: CommandLog) -> Self {
        Self {
            line,
            buffer: CommandBuffer::default(),
            pending: VecDeque::new(),
            log,
            stop_flag: Arc::new(AtomicBool::new(false)),
            pulser: None,
        }
    }

    pub fn is_pulsing(&self) -> bool {
        self.pulser.is_some()
    }

    fn start_pulsing(&mut self, rate: u32) -> io::Result<()> {
        self.stop_pulsing();
        if rate == 0 {
            return Ok(());
        }
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = stop_flag.clone();
        let line = self.line.clone();
        let period = Duration::from_secs_f64(1.0 / rate as f64);
        let handle = std::thread::Builder::new()
            .name("sim-arduino".to_string())
            .spawn(move || {
                let stopped = || stop_flag.load(Ordering::Acquire);
                let mut next = Instant::now();
                while !stopped() {
                    line.pulse();
                    next += period;
                    if !sleep_until(next, Duration::from_millis(1), stopped) {
                        break;
                    }
                }
            })?;
        self.pulser = Some(handle);
        Ok(())
    }

    fn stop_pulsing(&mut self) {
        if let Some(handle) = self.pulser.take() {
            self.stop_flag.store(true, Ordering::Release);
            if handle.join().is_err() {
                tracing::warn!("Simulated pulse thread panicked");
            }
        }
    }

    fn execute(&mut self, command: &str) -> io::Result<()> {
        self.log.push(command);
        let (op, arg) = command.split_at(command.chars().next().map_or(0, char::len_utf8));
        match op {
            "P" => self.reply("trigcam-sim"),
            "S" => match arg.trim().parse::<u32>() {
                Ok(rate) => self.start_pulsing(rate)?,
                Err(_) => tracing::warn!(command, "Arduino rejected rate"),
            },
            "Q" => self.stop_pulsing(),
            "T" => tracing::debug!(text = arg, "Arduino received text"),
            _ => tracing::warn!(command, "Arduino ignored command"),
        }
        Ok(())
    }

    fn reply(&mut self, text: &str) {
        self.pending.extend(text.as_bytes());
        self.pending.extend(PROMPT.as_bytes());
    }
}

impl Read for SimulatedArduino {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_pending(&mut self.pending, buf)
    }
}

impl Write for SimulatedArduino {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for command in self.buffer.push(buf) {
            self.execute(&command)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SimulatedArduino {
    fn drop(&mut self) {
        self.stop_pulsing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_split_on_carriage_return() {
        let mut buffer = CommandBuffer::default();
        assert!(buffer.push(b"gpio se").is_empty());
        assert_eq!(buffer.push(b"t 0\rver\r\r"), ["gpio set 0", "ver"]);
    }

    #[test]
    fn gpio_module_drives_the_line() {
        let line = PulseLine::new();
        let log = CommandLog::default();
        let mut module = SimulatedGpioModule::new(line.clone(), 0, log.clone());
        module.write_all(b"gpio set 0\rgpio clear 0\rgpio set 3\r").unwrap();
        assert_eq!(line.pulses(), 1);
        assert!(!line.is_high());
        assert_eq!(log.commands().len(), 3);
    }

    #[test]
    fn gpio_module_answers_version() {
        let mut module = SimulatedGpioModule::new(PulseLine::new(), 0, CommandLog::default());
        module.write_all(b"ver\r").unwrap();
        let mut buf = [0u8; 100];
        let n = module.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ver\n\r>00000008\n\r>");
        assert!(module.read(&mut buf).is_err());
    }

    #[test]
    fn arduino_pulses_between_start_and_stop() {
        let line = PulseLine::new();
        let log = CommandLog::default();
        let mut arduino = SimulatedArduino::new(line.clone(), log.clone());
        arduino.write_all(b"S50\r").unwrap();
        assert!(arduino.is_pulsing());
        std::thread::sleep(Duration::from_millis(100));
        arduino.write_all(b"Q\r").unwrap();
        assert!(!arduino.is_pulsing());

        let pulses = line.pulses();
        assert!((3..=8).contains(&pulses), "pulses = {pulses}");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(line.pulses(), pulses);
        assert_eq!(log.commands(), ["S50", "Q"]);
    }

    #[test]
    fn arduino_answers_ping() {
        let mut arduino = SimulatedArduino::new(PulseLine::new(), CommandLog::default());
        arduino.write_all(b"P\r").unwrap();
        let mut buf = [0u8; 100];
        let n = arduino.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"trigcam-sim\n\r>");
    }
}
