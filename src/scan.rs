extern crate enderscope;
extern crate getopts;

use enderscope::coords::Point;
use enderscope::scan_path::{self, Pattern, Placement};
use enderscope::scope_config_parser;
use enderscope::stage::Stage;

use getopts::{Matches, Options};
use log::info;
use std::env;
use std::error::Error;
use std::fmt::Display;
use std::io::Write;
use std::process;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

fn usage(prg: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", prg);
    print!("{}", opts.usage(&brief));
}

fn opt_value<T>(matches: &Matches, name: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    match matches.opt_str(name) {
        Some(arg) => T::from_str(&arg).map_err(|err| format!("Invalid {} '{}': {}", name, arg, err)),
        None => Ok(default),
    }
}

fn parse_origin(arg: &str) -> Result<Point, String> {
    let xy = arg
        .split(',')
        .map(|v| f64::from_str(v.trim()))
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|err| format!("Invalid origin '{}': {}", arg, err))?;
    match xy.as_slice() {
        [x, y] => Ok(Point::new(*x, *y)),
        _ => Err(format!("Expected X,Y as origin, got '{}'", arg)),
    }
}

fn run(matches: &Matches) -> Result<(), Box<dyn Error>> {
    let pattern = Pattern::from_name(
        &matches.opt_str("pattern").unwrap_or_else(|| "snake".to_string()),
        opt_value(matches, "cols", 4)?,
        opt_value(matches, "rows", 3)?,
        opt_value(matches, "points", 10)?,
        opt_value(matches, "seed", 1)?,
    )?;
    let step: f64 = opt_value(matches, "step", 5.0)?;
    let dwell = Duration::from_millis(opt_value(matches, "dwell", 0)?);
    let origin = match matches.opt_str("origin") {
        Some(arg) => Some(parse_origin(&arg)?),
        None => None,
    };

    let config_file = matches.opt_str("config").ok_or("No configuration file")?;
    let config = scope_config_parser::read_config(&config_file)?;

    if matches.opt_present("dry-run") {
        let placement = Placement {
            step,
            origin: origin.unwrap_or(Point::new(0.0, 0.0)),
        };
        let path = scan_path::generate(&pattern, &placement, &config.travel)?;
        for (k, p) in path.iter().enumerate() {
            println!("point {} {} {}", k + 1, p.x, p.y);
        }
        return Ok(());
    }

    let mut stage = Stage::open(&config.stage)?;
    let origin = match origin {
        Some(o) => o,
        None => {
            let here = stage.get_position()?;
            Point::new(here.x, here.y)
        }
    };
    // Refuse the whole scan before the first move
    let path = scan_path::generate(&pattern, &Placement { step, origin }, &config.travel)?;
    info!("Scanning {} points from {}", path.len(), origin);

    let stdout = std::io::stdout();
    for (k, p) in path.iter().enumerate() {
        stage.move_absolute(p.x, p.y, None)?;
        stage.wait_for_idle()?;
        {
            let mut out = stdout.lock();
            writeln!(out, "point {} {} {}", k + 1, p.x, p.y)?;
            out.flush()?;
        }
        if !dwell.is_zero() {
            thread::sleep(dwell);
        }
    }
    info!("Scan done");
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();
    let mut opts = Options::new();
    opts.optopt("c", "config", "scope configuration file", "FILE");
    opts.optopt("", "pattern", "raster, snake, random or spiral", "PATTERN");
    opts.optopt("", "cols", "grid columns (raster, snake)", "N");
    opts.optopt("", "rows", "grid rows (raster, snake)", "N");
    opts.optopt("", "points", "number of points (random, spiral)", "N");
    opts.optopt("", "seed", "random seed", "SEED");
    opts.optopt("s", "step", "distance between grid points (mm)", "MM");
    opts.optopt("o", "origin", "stage position of the first grid point", "X,Y");
    opts.optopt("", "dwell", "pause at every point for the camera", "MS");
    opts.optflag("n", "dry-run", "print the path without moving");
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
