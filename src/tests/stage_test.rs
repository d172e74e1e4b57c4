use super::mock_port::MockPort;
use crate::line_transport;
use crate::stage::{CoordinateMode, Direction, Error, ModePolicy, Position, Stage, StageOptions};
use std::thread;
use std::time::Duration;

fn mock_stage(port: MockPort) -> Stage<MockPort> {
    Stage::new(port.into_transport(), StageOptions::default())
}

fn written(stage: &Stage<MockPort>) -> Vec<String> {
    stage.transport().get_ref().lines_written()
}

#[test]
fn move_absolute_waits_for_ok() {
    let mut stage = mock_stage(
        MockPort::new()
            .reply("ok\n")
            .reply("ok\n")
            .reply("echo:busy: processing\necho:busy: processing\nok\nok P15 B3\n"),
    );
    stage.set_absolute().unwrap();
    stage.move_absolute(50.0, 50.0, None).unwrap();
    let lines = written(&stage);
    assert_eq!(lines, vec!["G90", "G90", "G0 X 50 Y 50"]);
    assert_eq!(lines.iter().filter(|l| l.starts_with("G0")).count(), 1);
    // Consumed up to and including the first ok
    assert_eq!(stage.transport().get_ref().unread(), "ok P15 B3\n");
    assert_eq!(stage.mode(), CoordinateMode::Absolute);
}

#[test]
fn mode_resent_only_when_changed() {
    let mut port = MockPort::new();
    for _ in 0..5 {
        port = port.reply("ok\n");
    }
    let options = StageOptions {
        mode_policy: ModePolicy::WhenChanged,
        ..Default::default()
    };
    let mut stage = Stage::new(port.into_transport(), options);
    assert_eq!(stage.mode(), CoordinateMode::Unknown);
    stage.move_absolute(10.0, 10.0, Some(2.0)).unwrap();
    stage.move_absolute(20.0, 10.0, None).unwrap();
    stage.move_relative(1.0, 0.0, None).unwrap();
    assert_eq!(
        written(&stage),
        vec!["G90", "G0 X 10 Y 10 Z 2", "G0 X 20 Y 10", "G91", "G0 X 1 Y 0"]
    );
    assert_eq!(stage.mode(), CoordinateMode::Relative);
}

#[test]
fn relative_and_directional_moves() {
    let mut port = MockPort::new();
    for _ in 0..8 {
        port = port.reply("ok\n");
    }
    let mut stage = mock_stage(port);
    stage.move_relative(1.0, -2.0, Some(0.5)).unwrap();
    stage.move_towards("South", 5.0).unwrap();
    stage.move_in_direction(Direction::Up, 1.0).unwrap();
    stage.move_axis_named("x", -0.25).unwrap();
    assert_eq!(
        written(&stage),
        vec![
            "G91",
            "G0 X 1 Y -2 Z 0.5",
            "G91",
            "G0 Y-5",
            "G91",
            "G0 Z1",
            "G91",
            "G0 X-0.25"
        ]
    );
}

#[test]
fn unknown_direction_sends_nothing() {
    let mut stage = mock_stage(MockPort::new());
    assert!(matches!(
        stage.move_towards("sideways", 5.0),
        Err(Error::UnknownDirection(_))
    ));
    assert!(matches!(
        stage.move_axis_named("e", 5.0),
        Err(Error::UnknownAxis(_))
    ));
    assert!(stage.transport().get_ref().written().is_empty());
}

#[test]
fn move_to_saved_positions() {
    let mut port = MockPort::new();
    for _ in 0..4 {
        port = port.reply("ok\n");
    }
    let mut stage = mock_stage(port);
    stage.move_to_position((10.0, 20.0)).unwrap();
    stage.move_to_position(Position::new(1.5, 2.5, 3.5)).unwrap();
    assert_eq!(
        written(&stage),
        vec!["G90", "G0 X 10 Y 20", "G90", "G0 X 1.5 Y 2.5 Z 3.5"]
    );
}

#[test]
fn home_and_wait_for_idle() {
    let mut stage = mock_stage(
        MockPort::new()
            .reply("echo:busy: processing\necho:busy: processing\nX:0.00 Y:0.00 Z:0.00 E:0.00 Count X:0 Y:0 Z:0\nok\n")
            .reply("ok\n"),
    );
    stage.home().unwrap();
    stage.wait_for_idle().unwrap();
    assert_eq!(written(&stage), vec!["G28", "M400"]);
}

#[test]
fn get_position_tuple() {
    let mut stage = mock_stage(
        MockPort::new()
            .stale("echo:Unknown command: \"pause\"\n")
            .reply("X:12.5 Y:3.0 Z:0.0 Count X:0 Y:0 Z:0\nok\n"),
    );
    let p = stage.get_position().unwrap();
    assert_relative_eq!(p.x, 12.5);
    assert_relative_eq!(p.y, 3.0);
    assert_relative_eq!(p.z, 0.0);
    assert_eq!(written(&stage), vec!["M114"]);
}

#[test]
fn get_position_mapping() {
    let mut stage = mock_stage(
        MockPort::new().reply("X:100.00 Y:95.50 Z:10.20 E:0.00 Count X:8000 Y:7640 Z:4080\nok\n"),
    );
    let axes = stage.get_position_map().unwrap();
    let names: Vec<&str> = axes.keys().map(|k| k.as_str()).collect();
    assert_eq!(names, vec!["E", "X", "Y", "Z"]);
    assert_relative_eq!(axes["Y"], 95.5);
    assert_relative_eq!(axes["Z"], 10.2);
}

#[test]
fn get_position_without_ack_is_unknown() {
    let mut stage = mock_stage(
        MockPort::new().reply("X:12.5 Y:3.0 Z:0.0 Count X:0 Y:0 Z:0\necho:busy: processing\n"),
    );
    match stage.get_position() {
        Err(Error::PositionUnknown { response }) => {
            assert_eq!(response, "echo:busy: processing")
        }
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[test]
fn get_position_malformed() {
    let mut stage = mock_stage(MockPort::new().reply("X:12.5 Z:0.0 Count X:0 Y:0 Z:0\nok\n"));
    assert!(matches!(
        stage.get_position(),
        Err(Error::MalformedPosition(_))
    ));
}

#[test]
fn unresponsive_controller_times_out() {
    let options = StageOptions {
        home_timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let mut stage = Stage::new(
        MockPort::new().reply("echo:busy: processing\n").into_transport(),
        options,
    );
    match stage.home() {
        Err(Error::Unresponsive { command }) => assert_eq!(command, "G28"),
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[test]
fn undecodable_response_is_reported() {
    let mut stage = mock_stage(MockPort::new().reply_bytes(b"\xff\xfe\n"));
    assert!(matches!(
        stage.wait_for_idle(),
        Err(Error::Transport(line_transport::Error::Decode(_)))
    ));
}

#[test]
fn late_ack_is_not_taken_for_the_next_command() {
    let options = StageOptions {
        mode_policy: ModePolicy::WhenChanged,
        ack_timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let port = MockPort::new()
        .reply("ok\n")
        .reply("ok\n")
        .reply_after("ok\n", Duration::from_millis(40))
        .reply("ok\n")
        .reply("ok\n");
    let mut stage = Stage::new(port.into_transport(), options);
    stage.move_absolute(10.0, 10.0, None).unwrap();
    match stage.move_relative(5.0, 5.0, None) {
        Err(Error::Unresponsive { command }) => assert_eq!(command, "G91"),
        other => panic!("Unexpected result: {:?}", other),
    }
    // G91 may or may not have been applied
    assert_eq!(stage.mode(), CoordinateMode::Unknown);

    thread::sleep(Duration::from_millis(60));
    stage.move_absolute(50.0, 50.0, None).unwrap();
    assert_eq!(
        written(&stage),
        vec!["G90", "G0 X 10 Y 10", "G91", "G90", "G0 X 50 Y 50"]
    );
    assert_eq!(stage.transport().get_ref().unread(), "");
    assert_eq!(stage.transport().get_ref().replies_left(), 0);
    assert_eq!(stage.mode(), CoordinateMode::Absolute);
}

#[test]
fn non_finite_coordinates_send_nothing() {
    let mut stage = mock_stage(MockPort::new());
    assert!(matches!(
        stage.move_absolute(f64::NAN, 10.0, None),
        Err(Error::NotFinite { axis: 'X', .. })
    ));
    assert!(matches!(
        stage.move_relative(1.0, 1.0, Some(f64::INFINITY)),
        Err(Error::NotFinite { axis: 'Z', .. })
    ));
    assert!(matches!(
        stage.move_towards("north", f64::NEG_INFINITY),
        Err(Error::NotFinite { axis: 'Y', .. })
    ));
    assert!(stage.transport().get_ref().written().is_empty());
}
