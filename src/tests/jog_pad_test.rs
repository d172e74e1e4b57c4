use super::mock_port::MockPort;
use crate::jog_pad::{Button, Error, JogPad};
use crate::position_registry::PositionRegistry;
use crate::scope_config::JogConfig;
use crate::stage::{Direction, Position, Stage, StageOptions};

const REPORT: &str = "X:10.00 Y:20.00 Z:1.00 E:0.00 Count X:800 Y:1600 Z:400\nok\n";

fn pad() -> JogPad {
    JogPad::new(&JogConfig::default(), PositionRegistry::new())
}

#[test]
fn parse_buttons() {
    assert_eq!("North".parse::<Button>().unwrap(), Button::Move(Direction::North));
    assert_eq!("home".parse::<Button>().unwrap(), Button::Home);
    assert_eq!("P1".parse::<Button>().unwrap(), Button::Slot(0));
    assert_eq!("p6".parse::<Button>().unwrap(), Button::Slot(5));
    for label in &["P0", "P7", "Px", "Save"] {
        assert!(matches!(label.parse::<Button>(), Err(Error::UnknownButton(_))));
    }
}

#[test]
fn jog_uses_axis_step() {
    let port = MockPort::new()
        .reply("ok\n")
        .reply("ok\n")
        .reply("ok\n")
        .reply(REPORT)
        .reply("ok\n")
        .reply("ok\n")
        .reply("ok\n")
        .reply(REPORT);
    let mut stage = Stage::new(port.into_transport(), StageOptions::default());
    let mut pad = pad();
    let p = pad.press(&mut stage, Button::Move(Direction::West)).unwrap();
    assert_eq!(p, Position::new(10.0, 20.0, 1.0));
    pad.press(&mut stage, Button::Move(Direction::Up)).unwrap();
    assert_eq!(
        stage.transport().get_ref().lines_written(),
        vec!["G91", "G0 X-5", "M400", "M114", "G91", "G0 Z1", "M400", "M114"]
    );
}

#[test]
fn record_then_recall() {
    let port = MockPort::new()
        // record
        .reply(REPORT)
        .reply("ok\n")
        .reply(REPORT)
        // recall
        .reply("ok\n")
        .reply("ok\n")
        .reply("ok\n")
        .reply(REPORT);
    let mut stage = Stage::new(port.into_transport(), StageOptions::default());
    let mut pad = pad();
    pad.set_recording(true);
    pad.press(&mut stage, Button::Slot(2)).unwrap();
    assert_eq!(pad.registry().recall(2), Ok(Position::new(10.0, 20.0, 1.0)));

    pad.set_recording(false);
    pad.press(&mut stage, Button::Slot(2)).unwrap();
    assert_eq!(
        stage.transport().get_ref().lines_written(),
        vec!["M114", "M400", "M114", "G90", "G0 X 10 Y 20 Z 1", "M400", "M114"]
    );
}

#[test]
fn empty_slot_does_not_move() {
    let port = MockPort::new().reply("ok\n").reply(REPORT);
    let mut stage = Stage::new(port.into_transport(), StageOptions::default());
    let mut pad = pad();
    pad.press(&mut stage, Button::Slot(4)).unwrap();
    assert_eq!(
        stage.transport().get_ref().lines_written(),
        vec!["M400", "M114"]
    );
}
