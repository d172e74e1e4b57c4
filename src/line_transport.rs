//! Newline framed command/response channel over a serial port.

use log::debug;
use serde::Deserialize;
use std::io;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use thiserror::Error;

use serial::core::{SerialDevice, SerialPortSettings};

/// Read timeout of the underlying port. Reads are retried on expiry.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Poll timeout used while draining stale input
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serial::Error,
    },
    #[error("failed to configure {port}: {source}")]
    Configure {
        port: String,
        #[source]
        source: serial::Error,
    },
    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("response is not valid UTF-8: {0:?}")]
    Decode(Vec<u8>),
    #[error("serial stream closed")]
    Closed,
    #[error("timed out waiting for a response line")]
    TimedOut,
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("invalid port pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ByteSize {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

/// Everything needed to open a port
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub byte_size: ByteSize,
}

impl SerialSettings {
    /// 8N1 settings for `port`
    pub fn new(port: &str, baud_rate: u32) -> SerialSettings {
        SerialSettings {
            port: port.to_string(),
            baud_rate,
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            byte_size: ByteSize::default(),
        }
    }
}

/// A byte stream that can be polled with a bounded read timeout.
pub trait SerialLink: Read + Write {
    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl SerialLink for serial::SystemPort {
    fn set_poll_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout)
            .map_err(|e| io::Error::new(ErrorKind::Other, e))
    }
}

fn is_poll_expiry(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Opens and configures a system serial port.
pub fn open_port(settings: &SerialSettings) -> Result<serial::SystemPort> {
    let mut port = serial::open(&settings.port).map_err(|e| Error::Open {
        port: settings.port.clone(),
        source: e,
    })?;
    let configure_err = |e: serial::Error| Error::Configure {
        port: settings.port.clone(),
        source: e,
    };
    let baud = serial::BaudRate::from_speed(settings.baud_rate as usize);
    let mut port_settings = port.read_settings().map_err(configure_err)?;
    port_settings.set_baud_rate(baud).map_err(configure_err)?;
    port_settings.set_char_size(match settings.byte_size {
        ByteSize::Five => serial::CharSize::Bits5,
        ByteSize::Six => serial::CharSize::Bits6,
        ByteSize::Seven => serial::CharSize::Bits7,
        ByteSize::Eight => serial::CharSize::Bits8,
    });
    port_settings.set_parity(match settings.parity {
        Parity::None => serial::Parity::ParityNone,
        Parity::Odd => serial::Parity::ParityOdd,
        Parity::Even => serial::Parity::ParityEven,
    });
    port_settings.set_stop_bits(match settings.stop_bits {
        StopBits::One => serial::StopBits::Stop1,
        StopBits::Two => serial::StopBits::Stop2,
    });
    port_settings.set_flow_control(serial::FlowControl::FlowNone);
    port.write_settings(&port_settings).map_err(configure_err)?;
    port.set_timeout(POLL_TIMEOUT).map_err(configure_err)?;
    debug!(
        "Opened {} at {} baud",
        settings.port, settings.baud_rate
    );
    Ok(port)
}

pub struct LineTransport<P: SerialLink> {
    port: P,
}

impl LineTransport<serial::SystemPort> {
    pub fn open(settings: &SerialSettings) -> Result<LineTransport<serial::SystemPort>> {
        Ok(LineTransport::new(open_port(settings)?))
    }
}

impl<P: SerialLink> LineTransport<P> {
    pub fn new(port: P) -> LineTransport<P> {
        LineTransport { port }
    }

    pub fn get_ref(&self) -> &P {
        &self.port
    }

    /// Writes `text`, appending a newline unless it already ends with one.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        let mut line = String::from(text);
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        debug!("> {}", line.trim_end());
        Ok(())
    }

    /// Throws away whatever is waiting in the input buffer.
    ///
    /// Returns the number of discarded bytes.
    pub fn discard_input(&mut self) -> Result<usize> {
        self.port.set_poll_timeout(DRAIN_TIMEOUT)?;
        let mut buf = [0u8; 64];
        let mut discarded = 0;
        let drained = loop {
            match self.port.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => discarded += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(ref e) if is_poll_expiry(e) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.port.set_poll_timeout(POLL_TIMEOUT)?;
        drained?;
        if discarded > 0 {
            debug!("Discarded {} stale bytes", discarded);
        }
        Ok(discarded)
    }

    /// Reads one line, without its terminator.
    ///
    /// Blocks until a newline arrives, or until `deadline` has passed if
    /// one is given.
    pub fn read_line(&mut self, deadline: Option<Instant>) -> Result<String> {
        let mut reply = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            match self.port.read(&mut buf) {
                Ok(1) => {
                    if buf[0] == b'\n' {
                        break;
                    }
                    reply.push(buf[0]);
                }
                Ok(_) => return Err(Error::Closed),
                Err(ref e) if is_poll_expiry(e) => {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            return Err(Error::TimedOut);
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        if reply.last() == Some(&b'\r') {
            reply.pop();
        }
        let line = String::from_utf8(reply).map_err(|e| Error::Decode(e.into_bytes()))?;
        debug!("< {}", line);
        Ok(line)
    }
}

/// Candidate device names for the operating system `os`, as named by
/// `std::env::consts::OS`.
pub fn candidate_ports(os: &str) -> Result<Vec<String>> {
    let pattern = match os {
        "windows" => return Ok((1..=256).map(|i| format!("COM{}", i)).collect()),
        // Skips the controlling terminal /dev/tty
        "linux" | "cygwin" => "/dev/tty[A-Za-z]*",
        "macos" => "/dev/tty.*",
        _ => return Err(Error::UnsupportedPlatform(os.to_string())),
    };
    Ok(glob::glob(pattern)?
        .filter_map(|entry| entry.ok())
        .map(|path| path.to_string_lossy().into_owned())
        .collect())
}

/// Lists the serial ports on this host that can actually be opened.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = candidate_ports(std::env::consts::OS)?
        .into_iter()
        .filter(|name| serial::open(name).is_ok())
        .collect();
    Ok(ports)
}

#[test]
fn test_candidate_ports_windows() {
    let ports = candidate_ports("windows").unwrap();
    assert_eq!(ports.len(), 256);
    assert_eq!(ports[0], "COM1");
    assert_eq!(ports[255], "COM256");
}

#[test]
fn test_candidate_ports_unsupported() {
    match candidate_ports("plan9") {
        Err(Error::UnsupportedPlatform(os)) => assert_eq!(os, "plan9"),
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[test]
fn test_candidate_ports_unix() {
    for os in ["linux", "cygwin"].iter() {
        for port in candidate_ports(os).unwrap() {
            assert!(port.starts_with("/dev/tty"));
            assert_ne!(port, "/dev/tty");
        }
    }
    for port in candidate_ports("macos").unwrap() {
        assert!(port.starts_with("/dev/tty."));
    }
}
