extern crate enderscope;
extern crate getopts;

use enderscope::jog_pad::{Button, JogPad};
use enderscope::lights::EnderLights;
use enderscope::line_transport;
use enderscope::position_registry::{PositionRegistry, SLOT_COUNT};
use enderscope::scope_config_parser;
use enderscope::stage::Stage;

use getopts::{Matches, Options};
use log::info;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::process;
use std::str::FromStr;

fn usage(prg: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", prg);
    print!("{}", opts.usage(&brief));
}

/// Parses "1.5,2,3" into between `min` and `max` numbers
fn parse_list<T: FromStr>(arg: &str, min: usize, max: usize) -> Result<Vec<T>, String> {
    let values = arg
        .split(',')
        .map(|v| v.trim().parse::<T>())
        .collect::<Result<Vec<T>, _>>()
        .map_err(|_| format!("Invalid number in '{}'", arg))?;
    if values.len() < min || values.len() > max {
        return Err(format!("Expected {} to {} values in '{}'", min, max, arg));
    }
    Ok(values)
}

/// Parses "NAME:DISTANCE"
fn parse_named_distance(arg: &str) -> Result<(String, f64), String> {
    match arg.split_once(':') {
        Some((name, dist)) => match f64::from_str(dist.trim()) {
            Ok(d) => Ok((name.trim().to_string(), d)),
            Err(err) => Err(format!("Invalid distance '{}': {}", dist, err)),
        },
        None => Err(format!("Expected NAME:DISTANCE, got '{}'", arg)),
    }
}

fn load_slots(file_name: &str) -> Result<PositionRegistry, Box<dyn Error>> {
    if !Path::new(file_name).exists() {
        return Ok(PositionRegistry::new());
    }
    let file = File::open(file_name)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn save_slots(file_name: &str, registry: &PositionRegistry) -> Result<(), Box<dyn Error>> {
    let file = File::create(file_name)?;
    serde_json::to_writer_pretty(BufWriter::new(file), registry)?;
    Ok(())
}

fn slot_number(matches: &Matches, name: &str) -> Result<Option<usize>, String> {
    match matches.opt_str(name) {
        Some(arg) => match usize::from_str(&arg) {
            Ok(n) if (1..=SLOT_COUNT).contains(&n) => Ok(Some(n)),
            _ => Err(format!(
                "Invalid slot number '{}', slots are P1 to P{}",
                arg, SLOT_COUNT
            )),
        },
        None => Ok(None),
    }
}

fn run(matches: &Matches) -> Result<(), Box<dyn Error>> {
    if matches.opt_present("list-ports") {
        for port in line_transport::list_ports()? {
            println!("{}", port);
        }
    }

    let config_file = match matches.opt_str("config") {
        Some(f) => f,
        None => {
            if matches.opt_present("list-ports") {
                return Ok(());
            }
            return Err("No configuration file".into());
        }
    };
    let config = scope_config_parser::read_config(&config_file)?;

    let light_actions = ["color", "shutter", "reset-lights", "lights-state"];
    if light_actions.iter().any(|a| matches.opt_present(a)) {
        let lights_config = config
            .lights
            .as_ref()
            .ok_or("No illumination configured")?;
        let mut lights = EnderLights::open(lights_config)?;
        if matches.opt_present("reset-lights") {
            lights.reset()?;
        }
        if let Some(arg) = matches.opt_str("color") {
            let rgb = parse_list::<i64>(&arg, 3, 3)?;
            lights.color(rgb[0], rgb[1], rgb[2])?;
        }
        if let Some(arg) = matches.opt_str("shutter") {
            match arg.as_str() {
                "on" | "open" => lights.shutter(true)?,
                "off" | "closed" => lights.shutter(false)?,
                _ => return Err(format!("Invalid shutter state '{}'", arg).into()),
            }
        }
        if matches.opt_present("lights-state") {
            println!("{}", lights.query_state()?);
        }
    }

    let stage_actions = [
        "home", "goto", "jog", "axis", "position", "record", "recall", "button",
    ];
    if !stage_actions.iter().any(|a| matches.opt_present(a)) {
        return Ok(());
    }

    let record = slot_number(matches, "record")?;
    let recall = slot_number(matches, "recall")?;
    let slots_file = matches.opt_str("slots");
    if (record.is_some() || recall.is_some()) && slots_file.is_none() {
        return Err("--record and --recall need --slots".into());
    }
    let registry = match &slots_file {
        Some(f) => load_slots(f)?,
        None => PositionRegistry::new(),
    };
    let mut pad = JogPad::new(&config.jog, registry);

    let mut stage = Stage::open(&config.stage)?;
    let mut moved = false;
    if matches.opt_present("home") {
        stage.home()?;
        moved = true;
    }
    if let Some(arg) = matches.opt_str("goto") {
        let xyz = parse_list::<f64>(&arg, 2, 3)?;
        stage.move_absolute(xyz[0], xyz[1], xyz.get(2).copied())?;
        moved = true;
    }
    if let Some(arg) = matches.opt_str("jog") {
        let (direction, distance) = parse_named_distance(&arg)?;
        stage.move_towards(&direction, distance)?;
        moved = true;
    }
    if let Some(arg) = matches.opt_str("axis") {
        let (axis, distance) = parse_named_distance(&arg)?;
        stage.move_axis_named(&axis, distance)?;
        moved = true;
    }
    for label in matches.opt_strs("button") {
        let button = label.parse::<Button>()?;
        let position = pad.press(&mut stage, button)?;
        println!("{}: {}", label, position);
    }
    if let Some(n) = recall {
        pad.set_recording(false);
        pad.press(&mut stage, Button::Slot(n - 1))?;
    }
    if moved {
        stage.wait_for_idle()?;
    }
    if let Some(n) = record {
        pad.set_recording(true);
        let position = pad.press(&mut stage, Button::Slot(n - 1))?;
        info!("Saved P{} = {}", n, position);
    }
    if let Some(f) = &slots_file {
        save_slots(f, pad.registry())?;
    }
    if matches.opt_present("position") {
        let position = stage.get_position()?;
        println!("{}", position);
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();
    let mut opts = Options::new();
    opts.optopt("c", "config", "scope configuration file", "FILE");
    opts.optflag("l", "list-ports", "list serial ports that can be opened");
    opts.optflag("", "home", "home all axes");
    opts.optopt("g", "goto", "move to absolute coordinates (mm)", "X,Y[,Z]");
    opts.optopt("j", "jog", "move north/south/east/west/up/down", "DIR:DIST");
    opts.optopt("", "axis", "move a single axis relative", "AXIS:DIST");
    opts.optmulti("b", "button", "press a panel button (North, Home, P1 ...)", "LABEL");
    opts.optopt("", "slots", "saved positions file", "FILE");
    opts.optopt("", "record", "record current position in slot N", "N");
    opts.optopt("", "recall", "move to position saved in slot N", "N");
    opts.optflag("p", "position", "print the current position");
    opts.optopt("", "color", "set illumination levels", "R,G,B");
    opts.optopt("", "shutter", "open or close the shutter", "on|off");
    opts.optflag("", "reset-lights", "reset the illumination ring");
    opts.optflag("", "lights-state", "print the illumination state");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            println!("{}", f);
            usage(&program, opts);
            process::exit(1);
        }
    };
    if matches.opt_present("h") {
        usage(&program, opts);
        return;
    }
    if let Err(e) = run(&matches) {
        println!("{}", e);
        process::exit(1);
    }
}

#[test]
fn test_slot_number() {
    let mut opts = Options::new();
    opts.optopt("", "record", "", "N");
    let parse = |arg: &str| {
        let matches = opts.parse(vec!["--record", arg]).unwrap();
        slot_number(&matches, "record")
    };
    assert_eq!(parse("1"), Ok(Some(1)));
    assert_eq!(parse("6"), Ok(Some(6)));
    assert!(parse("0").is_err());
    assert!(parse("7").is_err());
    assert!(parse("P2").is_err());
}
