use crate::coords::{Point, Transform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;

/// Longest path a single scan may visit
pub const MAX_POINTS: usize = 1 << 20;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("path point {index} at {point} exceeds travel limits")]
    ExceedsTravel { index: usize, point: Point },
    #[error("path has no points")]
    Empty,
    #[error("path has more than {} points", MAX_POINTS)]
    TooManyPoints,
    #[error("invalid grid step {0}")]
    InvalidStep(f64),
    #[error("invalid sampling bounds")]
    InvalidBounds,
    #[error("unknown scan pattern '{0}'")]
    UnknownPattern(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Physical travel range of the stage in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelLimits {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for TravelLimits {
    /// Ender-3 bed
    fn default() -> TravelLimits {
        TravelLimits {
            x_min: 0.0,
            x_max: 235.0,
            y_min: 0.0,
            y_max: 235.0,
        }
    }
}

impl TravelLimits {
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }
}

/// Rectangle random points are drawn from, in millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for RandomBounds {
    fn default() -> RandomBounds {
        RandomBounds {
            x_min: 0.0,
            x_max: 180.0,
            y_min: 0.0,
            y_max: 180.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pattern {
    Raster { cols: usize, rows: usize },
    Snake { cols: usize, rows: usize },
    Random { points: usize, seed: u64, bounds: RandomBounds },
    Spiral { points: usize },
}

impl Pattern {
    /// Builds a pattern from its name. Grid patterns use `cols` and `rows`,
    /// the others `points` (and `seed`).
    pub fn from_name(name: &str, cols: usize, rows: usize, points: usize, seed: u64) -> Result<Pattern> {
        match name.to_ascii_lowercase().as_str() {
            "raster" => Ok(Pattern::Raster { cols, rows }),
            "snake" => Ok(Pattern::Snake { cols, rows }),
            "random" => Ok(Pattern::Random {
                points,
                seed,
                bounds: RandomBounds::default(),
            }),
            "spiral" => Ok(Pattern::Spiral { points }),
            _ => Err(Error::UnknownPattern(name.to_string())),
        }
    }

    /// Grid relative points, not yet placed on the stage
    pub fn points(&self) -> Result<Vec<Point>> {
        match *self {
            Pattern::Raster { cols, rows } => Ok(raster(cols, rows)),
            Pattern::Snake { cols, rows } => Ok(snake(cols, rows)),
            Pattern::Random { points, seed, bounds } => random(points, seed, &bounds),
            Pattern::Spiral { points } => Ok(spiral(points)),
        }
    }

    /// Number of points the pattern visits, `None` if it does not fit a `usize`
    pub fn point_count(&self) -> Option<usize> {
        match *self {
            Pattern::Raster { cols, rows } | Pattern::Snake { cols, rows } => cols.checked_mul(rows),
            Pattern::Random { points, .. } | Pattern::Spiral { points } => Some(points),
        }
    }

    /// Random points are already in millimetres and are not scaled by the
    /// grid step.
    fn is_metric(&self) -> bool {
        matches!(self, Pattern::Random { .. })
    }
}

/// How grid points map onto the stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Millimetres between neighbouring grid cells
    pub step: f64,
    /// Stage position of grid point (0, 0)
    pub origin: Point,
}

impl Placement {
    pub fn transform(&self, metric: bool) -> Transform {
        let scale = if metric { 1.0 } else { self.step };
        Transform::translate(self.origin.x, self.origin.y) * Transform::scale(scale)
    }
}

/// Row major, left to right on every row
pub fn raster(cols: usize, rows: usize) -> Vec<Point> {
    (0..rows)
        .flat_map(|y| (0..cols).map(move |x| Point::new(x as f64, y as f64)))
        .collect()
}

/// Row major, even rows left to right and odd rows right to left
pub fn snake(cols: usize, rows: usize) -> Vec<Point> {
    let mut path = Vec::new();
    for y in 0..rows {
        if y % 2 == 0 {
            path.extend((0..cols).map(|x| Point::new(x as f64, y as f64)));
        } else {
            path.extend((0..cols).rev().map(|x| Point::new(x as f64, y as f64)));
        }
    }
    path
}

/// `n` uniformly distributed points. The same seed always gives the same
/// points.
pub fn random(n: usize, seed: u64, bounds: &RandomBounds) -> Result<Vec<Point>> {
    if !(bounds.x_min < bounds.x_max && bounds.y_min < bounds.y_max) {
        return Err(Error::InvalidBounds);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let xs: Vec<f64> = (0..n)
        .map(|_| rng.gen_range(bounds.x_min..bounds.x_max))
        .collect();
    let ys: Vec<f64> = (0..n)
        .map(|_| rng.gen_range(bounds.y_min..bounds.y_max))
        .collect();
    Ok(xs.into_iter().zip(ys).map(|(x, y)| Point::new(x, y)).collect())
}

const SPIRAL_DIRECTIONS: [(f64, f64); 4] = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];

/// Square spiral out from the origin: east, north, west, south with leg
/// lengths 1, 1, 2, 2, 3, 3, ...
pub fn spiral(n: usize) -> Vec<Point> {
    let mut path = Vec::new();
    let mut p = Point::new(0.0, 0.0);
    let mut dir = 0;
    let mut leg = 1;
    if n > 0 {
        path.push(p);
    }
    while path.len() < n {
        let (dx, dy) = SPIRAL_DIRECTIONS[dir];
        for _ in 0..leg {
            if path.len() == n {
                break;
            }
            p += Point::new(dx, dy);
            path.push(p);
        }
        dir = (dir + 1) % 4;
        // Legs grow after every second turn
        if dir % 2 == 0 {
            leg += 1;
        }
    }
    path
}

/// Checks that every point lies within `limits`.
pub fn validate(points: &[Point], limits: &TravelLimits) -> Result<()> {
    match points.iter().position(|p| !limits.contains(p)) {
        Some(index) => Err(Error::ExceedsTravel {
            index,
            point: points[index],
        }),
        None => Ok(()),
    }
}

/// Generates `pattern`, places it on the stage and validates it.
///
/// Returns absolute stage coordinates in visiting order.
pub fn generate(pattern: &Pattern, placement: &Placement, limits: &TravelLimits) -> Result<Vec<Point>> {
    if !(placement.step.is_finite() && placement.step > 0.0) {
        return Err(Error::InvalidStep(placement.step));
    }
    match pattern.point_count() {
        Some(0) => return Err(Error::Empty),
        Some(n) if n <= MAX_POINTS => {}
        _ => return Err(Error::TooManyPoints),
    }
    let transform = placement.transform(pattern.is_metric());
    let points: Vec<Point> = pattern.points()?.into_iter().map(|p| transform * p).collect();
    validate(&points, limits)?;
    Ok(points)
}
