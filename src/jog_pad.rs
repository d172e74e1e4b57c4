use crate::position_registry::{self, PositionRegistry, SLOT_COUNT};
use crate::scope_config::JogConfig;
use crate::stage::{self, Axis, Direction, Position, Stage};
use crate::line_transport::SerialLink;
use log::info;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Stage(#[from] stage::Error),
    #[error(transparent)]
    Registry(#[from] position_registry::Error),
    #[error("unknown button '{0}'")]
    UnknownButton(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Move(Direction),
    Home,
    /// Position slot, 0 based
    Slot(usize),
}

impl FromStr for Button {
    type Err = Error;
    /// Panel labels: `North` ... `Down`, `Home`, `P1` ... `P6`
    fn from_str(s: &str) -> Result<Button> {
        let label = s.trim().to_ascii_lowercase();
        if label == "home" {
            return Ok(Button::Home);
        }
        if let Some(n) = label.strip_prefix('p') {
            return match n.parse::<usize>() {
                Ok(n) if (1..=SLOT_COUNT).contains(&n) => Ok(Button::Slot(n - 1)),
                _ => Err(Error::UnknownButton(s.to_string())),
            };
        }
        label
            .parse::<Direction>()
            .map(Button::Move)
            .map_err(|_| Error::UnknownButton(s.to_string()))
    }
}

pub struct JogPad {
    registry: PositionRegistry,
    recording: bool,
    xy_step: f64,
    z_step: f64,
}

impl JogPad {
    pub fn new(config: &JogConfig, registry: PositionRegistry) -> JogPad {
        JogPad {
            registry,
            recording: false,
            xy_step: config.xy_step,
            z_step: config.z_step,
        }
    }

    pub fn set_steps(&mut self, xy_step: f64, z_step: f64) {
        self.xy_step = xy_step;
        self.z_step = z_step;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn registry(&self) -> &PositionRegistry {
        &self.registry
    }

    fn step_for(&self, direction: Direction) -> f64 {
        match direction.axis_sign().0 {
            Axis::Z => self.z_step,
            Axis::X | Axis::Y => self.xy_step,
        }
    }

    /// Acts on a button press, waits for the stage to settle and returns
    /// where it ended up.
    pub fn press<P: SerialLink>(&mut self, stage: &mut Stage<P>, button: Button) -> Result<Position> {
        match button {
            Button::Home => stage.home()?,
            Button::Slot(index) if self.recording => {
                let position = stage.get_position()?;
                self.registry.record(index, position)?;
                info!("Recorded P{} at {}", index + 1, position);
            }
            Button::Slot(index) => match self.registry.recall(index) {
                Ok(position) => stage.move_to_position(position)?,
                Err(position_registry::Error::NoPositionRecorded(_)) => {
                    info!("P{} is empty", index + 1)
                }
                Err(e) => return Err(e.into()),
            },
            Button::Move(direction) => {
                let step = self.step_for(direction);
                stage.move_in_direction(direction, step)?
            }
        }
        stage.wait_for_idle()?;
        Ok(stage.get_position()?)
    }
}
