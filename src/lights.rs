//! Client for the RGB illumination ring (an Arduino driving a NeoPixel
//! ring).
//!
//! Each command is a single letter followed by a number. The controller
//! answers every command with exactly one line. Unlike the stage, only that
//! one line is read. Anything other than `ok` is logged and passed back to
//! the caller without retrying.

use crate::line_transport::{self, LineTransport, SerialLink, SerialSettings};
use crate::scope_config::LightsConfig;
use log::warn;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const ACK: &str = "ok";
/// Level every channel gets on reset
pub const RESET_LEVEL: i64 = 20;
/// Device specific setup sent on reset
const RESET_CALIBRATION: &str = "MA65535";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] line_transport::Error),
    #[error("illumination controller unresponsive, no answer to '{command}'")]
    Unresponsive { command: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The values last sent to, and answered by, the controller.
///
/// `None` means nothing has been sent for that setting yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IlluminationState {
    pub shutter_open: Option<bool>,
    pub mode: Option<i64>,
    pub parameter: Option<i64>,
    pub red: Option<i64>,
    pub green: Option<i64>,
    pub blue: Option<i64>,
}

pub struct EnderLights<P: SerialLink> {
    link: LineTransport<P>,
    state: IlluminationState,
    timeout: Option<Duration>,
    // The last answer timed out and may still arrive
    stale: bool,
}

impl EnderLights<serial::SystemPort> {
    pub fn open(config: &LightsConfig) -> Result<EnderLights<serial::SystemPort>> {
        let settings = SerialSettings::new(&config.port, config.baud_rate);
        Ok(EnderLights::new(
            LineTransport::open(&settings)?,
            config.timeout_ms.map(Duration::from_millis),
        ))
    }
}

impl<P: SerialLink> EnderLights<P> {
    /// `timeout` bounds the wait for each response line, `None` waits forever
    pub fn new(link: LineTransport<P>, timeout: Option<Duration>) -> EnderLights<P> {
        EnderLights {
            link,
            state: IlluminationState::default(),
            timeout,
            stale: false,
        }
    }

    pub fn transport(&self) -> &LineTransport<P> {
        &self.link
    }

    pub fn state(&self) -> &IlluminationState {
        &self.state
    }

    fn exchange(&mut self, code: &str) -> Result<String> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        if self.stale {
            self.link.discard_input()?;
            self.stale = false;
        }
        self.link.write_line(code)?;
        let stale = &mut self.stale;
        self.link.read_line(deadline).map_err(|e| match e {
            line_transport::Error::TimedOut => {
                *stale = true;
                Error::Unresponsive {
                    command: code.to_string(),
                }
            }
            e => Error::Transport(e),
        })
    }

    /// Sends one command and returns the single line it is answered with.
    pub fn write_code(&mut self, code: &str) -> Result<String> {
        let response = self.exchange(code)?;
        if !response.starts_with(ACK) {
            warn!("Illumination answered '{}' to '{}'", response, code);
        }
        Ok(response)
    }

    /// Opens or closes the virtual shutter
    pub fn shutter(&mut self, open: bool) -> Result<()> {
        self.write_code(if open { "S1" } else { "S0" })?;
        self.state.shutter_open = Some(open);
        Ok(())
    }

    pub fn mode(&mut self, value: i64) -> Result<()> {
        self.write_code(&format!("M{}", value))?;
        self.state.mode = Some(value);
        Ok(())
    }

    pub fn parameter(&mut self, value: i64) -> Result<()> {
        self.write_code(&format!("P{}", value))?;
        self.state.parameter = Some(value);
        Ok(())
    }

    pub fn red(&mut self, value: i64) -> Result<()> {
        self.write_code(&format!("R{}", value))?;
        self.state.red = Some(value);
        Ok(())
    }

    pub fn green(&mut self, value: i64) -> Result<()> {
        self.write_code(&format!("G{}", value))?;
        self.state.green = Some(value);
        Ok(())
    }

    pub fn blue(&mut self, value: i64) -> Result<()> {
        self.write_code(&format!("B{}", value))?;
        self.state.blue = Some(value);
        Ok(())
    }

    /// Sets all three channels, one command each.
    ///
    /// Not atomic: if sending green or blue fails, the channels before it
    /// have already changed on the ring.
    pub fn color(&mut self, r: i64, g: i64, b: i64) -> Result<()> {
        self.red(r)?;
        self.green(g)?;
        self.blue(b)
    }

    /// Free text description of the controller state
    pub fn query_state(&mut self) -> Result<String> {
        self.exchange("?")
    }

    /// Closes the shutter and returns to mode 0 with a dim white
    pub fn reset(&mut self) -> Result<()> {
        self.shutter(false)?;
        self.mode(0)?;
        self.write_code(RESET_CALIBRATION)?;
        self.color(RESET_LEVEL, RESET_LEVEL, RESET_LEVEL)
    }
}
