//! G-code client for the three axis stage.
//!
//! Every command is written as one line and the client then blocks until
//! the controller answers with a line starting with `ok`. Anything the
//! controller prints before that (`echo:busy`, temperature reports and so
//! on) is logged and dropped.

use crate::line_transport::{self, LineTransport, SerialLink, SerialSettings};
use crate::scope_config::StageConfig;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const ACK: &str = "ok";

pub const SET_ABSOLUTE: &str = "G90";
pub const SET_RELATIVE: &str = "G91";
pub const HOME: &str = "G28";
pub const FINISH_MOVES: &str = "M400";
pub const REPORT_POSITION: &str = "M114";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] line_transport::Error),
    #[error("controller unresponsive, no acknowledgment for '{command}'")]
    Unresponsive { command: String },
    #[error("unknown direction '{0}'")]
    UnknownDirection(String),
    #[error("unknown axis '{0}'")]
    UnknownAxis(String),
    #[error("position unknown, controller answered '{response}'")]
    PositionUnknown { response: String },
    #[error("malformed position report '{0}'")]
    MalformedPosition(String),
    #[error("{axis} {value} is not a coordinate")]
    NotFinite { axis: char, value: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coordinate interpretation the controller was last told to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateMode {
    Unknown,
    Absolute,
    Relative,
}

/// When to send G90/G91 before a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModePolicy {
    /// Before every move, whatever the tracked mode is
    #[default]
    Always,
    /// Only when the tracked mode differs from the one needed
    WhenChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageOptions {
    pub mode_policy: ModePolicy,
    /// Acknowledgment timeout for ordinary commands, `None` waits forever
    pub ack_timeout: Option<Duration>,
    /// Acknowledgment timeout for homing, `None` waits forever
    pub home_timeout: Option<Duration>,
}

/// Stage coordinates in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Position {
        Position { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A `G0` move. Axes left as `None` are not mentioned in the command.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearMove {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub feed: Option<f64>,
}

impl LinearMove {
    pub fn xy(x: f64, y: f64) -> LinearMove {
        LinearMove {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn with_z(mut self, z: Option<f64>) -> LinearMove {
        self.z = z;
        self
    }

    pub fn with_feed(mut self, feed: Option<f64>) -> LinearMove {
        self.feed = feed;
        self
    }

    fn words(&self) -> [(char, Option<f64>); 4] {
        [('X', self.x), ('Y', self.y), ('Z', self.z), ('F', self.feed)]
    }

    pub fn check(&self) -> Result<()> {
        for (axis, value) in self.words().iter() {
            if let Some(v) = value {
                check_finite(*axis, *v)?;
            }
        }
        Ok(())
    }
}

fn check_finite(axis: char, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::NotFinite { axis, value })
    }
}

impl fmt::Display for LinearMove {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "G0")?;
        for (letter, value) in self.words().iter() {
            if let Some(v) = value {
                write!(f, " {} {}", letter, v)?;
            }
        }
        Ok(())
    }
}

impl From<Position> for LinearMove {
    fn from(p: Position) -> LinearMove {
        LinearMove::xy(p.x, p.y).with_z(Some(p.z))
    }
}

impl From<(f64, f64)> for LinearMove {
    fn from((x, y): (f64, f64)) -> LinearMove {
        LinearMove::xy(x, y)
    }
}

impl From<(f64, f64, f64)> for LinearMove {
    fn from((x, y, z): (f64, f64, f64)) -> LinearMove {
        LinearMove::xy(x, y).with_z(Some(z))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl FromStr for Axis {
    type Err = Error;
    fn from_str(s: &str) -> Result<Axis> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            _ => Err(Error::UnknownAxis(s.to_string())),
        }
    }
}

/// Jog directions as seen from above the sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    /// Axis moved and the sign applied to the distance
    pub fn axis_sign(self) -> (Axis, f64) {
        match self {
            Direction::North => (Axis::Y, 1.0),
            Direction::South => (Axis::Y, -1.0),
            Direction::East => (Axis::X, 1.0),
            Direction::West => (Axis::X, -1.0),
            Direction::Up => (Axis::Z, 1.0),
            Direction::Down => (Axis::Z, -1.0),
        }
    }
}

impl FromStr for Direction {
    type Err = Error;
    fn from_str(s: &str) -> Result<Direction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" => Ok(Direction::North),
            "south" => Ok(Direction::South),
            "east" => Ok(Direction::East),
            "west" => Ok(Direction::West),
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            _ => Err(Error::UnknownDirection(s.to_string())),
        }
    }
}

fn axis_move(axis: Axis, distance: f64) -> String {
    format!("G0 {}{}", axis.letter(), distance)
}

mod parser {
    use nom::bytes::complete::take_while1;
    use nom::character::complete::{char, space0, space1};
    use nom::combinator::all_consuming;
    use nom::multi::separated_list1;
    use nom::number::complete::double;
    use nom::sequence::{delimited, separated_pair};
    use nom::IResult;

    type Input<'a> = &'a str;

    fn axis_value(i: Input) -> IResult<Input, (Input, f64)> {
        separated_pair(
            take_while1(|c: char| c.is_ascii_alphabetic()),
            char(':'),
            double,
        )(i)
    }

    /// `X:12.50 Y:3.00 Z:0.00 E:0.00`
    pub fn axis_values(i: Input) -> IResult<Input, Vec<(Input, f64)>> {
        all_consuming(delimited(space0, separated_list1(space1, axis_value), space0))(i)
    }
}

/// Parses the coordinate part of an M114 report into axis name and value.
///
/// The stepper counts following `Count` are ignored.
pub fn parse_position_report(line: &str) -> Result<BTreeMap<String, f64>> {
    let report = match line.find("Count") {
        Some(end) => &line[..end],
        None => line,
    };
    let malformed = || Error::MalformedPosition(line.to_string());
    let (_, values) = parser::axis_values(report).map_err(|_| malformed())?;
    let mut axes = BTreeMap::new();
    for (name, value) in values {
        if !value.is_finite() {
            return Err(malformed());
        }
        axes.insert(name.to_string(), value);
    }
    Ok(axes)
}

fn position_from_axes(axes: &BTreeMap<String, f64>, line: &str) -> Result<Position> {
    let axis = |name: &str| {
        axes.get(name)
            .copied()
            .ok_or_else(|| Error::MalformedPosition(line.to_string()))
    };
    Ok(Position::new(axis("X")?, axis("Y")?, axis("Z")?))
}

pub struct Stage<P: SerialLink> {
    link: LineTransport<P>,
    mode: CoordinateMode,
    options: StageOptions,
    // A command timed out and its answer may still arrive
    stale: bool,
}

impl Stage<serial::SystemPort> {
    /// Opens the stage port and homes it if the configuration asks for it.
    pub fn open(config: &StageConfig) -> Result<Stage<serial::SystemPort>> {
        let settings = SerialSettings {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
            parity: config.framing.parity,
            stop_bits: config.framing.stop_bits,
            byte_size: config.framing.byte_size,
        };
        let mut stage = Stage::new(LineTransport::open(&settings)?, config.options());
        if config.home_on_startup {
            stage.home()?;
        }
        Ok(stage)
    }
}

impl<P: SerialLink> Stage<P> {
    pub fn new(link: LineTransport<P>, options: StageOptions) -> Stage<P> {
        Stage {
            link,
            mode: CoordinateMode::Unknown,
            options,
            stale: false,
        }
    }

    pub fn transport(&self) -> &LineTransport<P> {
        &self.link
    }

    pub fn mode(&self) -> CoordinateMode {
        self.mode
    }

    fn read_line(&mut self, command: &str, deadline: Option<Instant>) -> Result<String> {
        let stale = &mut self.stale;
        self.link.read_line(deadline).map_err(|e| match e {
            line_transport::Error::TimedOut => {
                *stale = true;
                Error::Unresponsive {
                    command: command.to_string(),
                }
            }
            e => Error::Transport(e),
        })
    }

    /// Writes `code`, first dropping any late answer to a timed out command.
    fn send(&mut self, code: &str) -> Result<()> {
        if self.stale {
            self.link.discard_input()?;
            self.stale = false;
        }
        self.link.write_line(code)?;
        Ok(())
    }

    /// Sends `code` and returns the acknowledgment line.
    ///
    /// Lines not starting with `ok` are skipped, however many there are.
    fn command(&mut self, code: &str, timeout: Option<Duration>) -> Result<String> {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.send(code)?;
        loop {
            let response = self.read_line(code, deadline)?;
            if response.starts_with(ACK) {
                return Ok(response);
            }
            debug!("Skipped '{}' while waiting for '{}'", response, code);
        }
    }

    fn force_mode(&mut self, mode: CoordinateMode) -> Result<()> {
        if self.options.mode_policy == ModePolicy::WhenChanged && self.mode == mode {
            return Ok(());
        }
        match mode {
            CoordinateMode::Absolute => self.set_absolute(),
            CoordinateMode::Relative => self.set_relative(),
            CoordinateMode::Unknown => Ok(()),
        }
    }

    fn set_mode(&mut self, code: &str, mode: CoordinateMode) -> Result<()> {
        // The controller may have switched even if the ack never came
        self.mode = CoordinateMode::Unknown;
        self.command(code, self.options.ack_timeout)?;
        self.mode = mode;
        Ok(())
    }

    pub fn set_absolute(&mut self) -> Result<()> {
        self.set_mode(SET_ABSOLUTE, CoordinateMode::Absolute)
    }

    pub fn set_relative(&mut self) -> Result<()> {
        self.set_mode(SET_RELATIVE, CoordinateMode::Relative)
    }

    /// Moves to stage coordinates. Z is left alone when not given.
    pub fn move_absolute(&mut self, x: f64, y: f64, z: Option<f64>) -> Result<()> {
        self.move_to_position(LinearMove::xy(x, y).with_z(z))
    }

    /// Moves to a previously recorded position, given as a [`Position`], an
    /// (x, y) pair, an (x, y, z) triple or a full [`LinearMove`].
    pub fn move_to_position<T: Into<LinearMove>>(&mut self, target: T) -> Result<()> {
        let target = target.into();
        target.check()?;
        self.force_mode(CoordinateMode::Absolute)?;
        self.command(&target.to_string(), self.options.ack_timeout)?;
        Ok(())
    }

    /// Moves by the given distances. Z is left alone when not given.
    pub fn move_relative(&mut self, dx: f64, dy: f64, dz: Option<f64>) -> Result<()> {
        let step = LinearMove::xy(dx, dy).with_z(dz);
        step.check()?;
        self.force_mode(CoordinateMode::Relative)?;
        self.command(&step.to_string(), self.options.ack_timeout)?;
        Ok(())
    }

    pub fn move_in_direction(&mut self, direction: Direction, distance: f64) -> Result<()> {
        let (axis, sign) = direction.axis_sign();
        self.move_axis(axis, sign * distance)
    }

    /// Like [`move_in_direction`](Self::move_in_direction) with the direction
    /// given by name. Unknown names fail before anything is sent.
    pub fn move_towards(&mut self, direction: &str, distance: f64) -> Result<()> {
        let direction = direction.parse::<Direction>()?;
        self.move_in_direction(direction, distance)
    }

    pub fn move_axis(&mut self, axis: Axis, distance: f64) -> Result<()> {
        check_finite(axis.letter(), distance)?;
        self.force_mode(CoordinateMode::Relative)?;
        self.command(&axis_move(axis, distance), self.options.ack_timeout)?;
        Ok(())
    }

    pub fn move_axis_named(&mut self, axis: &str, distance: f64) -> Result<()> {
        let axis = axis.parse::<Axis>()?;
        self.move_axis(axis, distance)
    }

    /// Homes all axes. This can take much longer than a normal move.
    pub fn home(&mut self) -> Result<()> {
        info!("Homing stage");
        self.command(HOME, self.options.home_timeout)?;
        Ok(())
    }

    /// Returns once every queued move has finished.
    pub fn wait_for_idle(&mut self) -> Result<()> {
        self.command(FINISH_MOVES, self.options.ack_timeout)?;
        Ok(())
    }

    /// Queries the position report. The report and its acknowledgment arrive
    /// as two separate lines.
    fn query_position(&mut self) -> Result<String> {
        let deadline = self.options.ack_timeout.map(|t| Instant::now() + t);
        self.link.discard_input()?;
        self.stale = false;
        self.link.write_line(REPORT_POSITION)?;
        let report = self.read_line(REPORT_POSITION, deadline)?;
        let ack = self.read_line(REPORT_POSITION, deadline)?;
        if !ack.starts_with(ACK) {
            warn!("Error reading stage position: '{}'", ack);
            return Err(Error::PositionUnknown { response: ack });
        }
        Ok(report)
    }

    pub fn get_position(&mut self) -> Result<Position> {
        let report = self.query_position()?;
        let axes = parse_position_report(&report)?;
        position_from_axes(&axes, &report)
    }

    /// Every axis in the position report, keyed by name (`X`, `Y`, `Z`, `E`, ...)
    pub fn get_position_map(&mut self) -> Result<BTreeMap<String, f64>> {
        let report = self.query_position()?;
        parse_position_report(&report)
    }
}

#[test]
fn test_linear_move_format() {
    assert_eq!(LinearMove::xy(50.0, 50.0).to_string(), "G0 X 50 Y 50");
    assert_eq!(
        LinearMove::xy(1.5, -2.0).with_z(Some(0.25)).to_string(),
        "G0 X 1.5 Y -2 Z 0.25"
    );
    assert_eq!(
        LinearMove::xy(0.0, 10.0).with_feed(Some(1200.0)).to_string(),
        "G0 X 0 Y 10 F 1200"
    );
    assert_eq!(axis_move(Axis::Y, -5.0), "G0 Y-5");
    assert_eq!(axis_move(Axis::Z, 0.5), "G0 Z0.5");
}

#[test]
fn test_parse_directions() {
    assert_eq!("North".parse::<Direction>().unwrap(), Direction::North);
    assert_eq!(" down".parse::<Direction>().unwrap(), Direction::Down);
    assert_eq!(Direction::West.axis_sign(), (Axis::X, -1.0));
    assert!(matches!(
        "northwest".parse::<Direction>(),
        Err(Error::UnknownDirection(_))
    ));
    assert_eq!("z".parse::<Axis>().unwrap(), Axis::Z);
    assert!(matches!("e".parse::<Axis>(), Err(Error::UnknownAxis(_))));
}

#[test]
fn test_parse_position_report() {
    let axes = parse_position_report("X:12.5 Y:3.0 Z:0.0 Count X:0 Y:0 Z:0").unwrap();
    assert_eq!(axes.len(), 3);
    assert_eq!(axes["X"], 12.5);
    assert_eq!(axes["Y"], 3.0);
    assert_eq!(axes["Z"], 0.0);

    let axes = parse_position_report("X:-1.00 Y:200.00 Z:5.25 E:0.00 Count X:-80 Y:16000 Z:2100").unwrap();
    assert_eq!(axes["E"], 0.0);
    assert_eq!(
        position_from_axes(&axes, "").unwrap(),
        Position::new(-1.0, 200.0, 5.25)
    );
}

#[test]
fn test_parse_position_report_malformed() {
    for line in &[
        "",
        "echo:busy: processing",
        "X:12.5 Y:abc Z:0.0 Count",
        "X:inf Y:0 Z:0",
        "X:1 Y:2 Z:3 trailing",
    ] {
        assert!(
            matches!(parse_position_report(line), Err(Error::MalformedPosition(_))),
            "accepted '{}'",
            line
        );
    }
    let axes = parse_position_report("X:1 Y:2").unwrap();
    assert!(matches!(
        position_from_axes(&axes, "X:1 Y:2"),
        Err(Error::MalformedPosition(_))
    ));
}
