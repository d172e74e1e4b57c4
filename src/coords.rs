use std::fmt;

/// A point in the stage XY plane, in grid cells or millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }

    /// Distance from the origin in the max norm
    pub fn chebyshev(&self) -> f64 {
        f64::max(self.x.abs(), self.y.abs())
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl std::ops::AddAssign<Point> for Point {
    fn add_assign(&mut self, v: Point) {
        self.x += v.x;
        self.y += v.y;
    }
}

impl std::ops::Sub<Point> for Point {
    type Output = Point;
    fn sub(self, v: Point) -> Point {
        Point {
            x: self.x - v.x,
            y: self.y - v.y,
        }
    }
}

/// Affine transform in the same layout as an SVG matrix:
/// `[a, b, c, d, e, f]` maps (x, y) to (a*x + c*y + e, b*x + d*y + f)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub matrix: [f64; 6],
}

fn matrix_mul(a: &[f64; 6], b: &[f64; 6]) -> [f64; 6] {
    [
        a[0] * b[0] + a[2] * b[1],
        a[1] * b[0] + a[3] * b[1],
        a[0] * b[2] + a[2] * b[3],
        a[1] * b[2] + a[3] * b[3],
        a[0] * b[4] + a[2] * b[5] + a[4],
        a[1] * b[4] + a[3] * b[5] + a[5],
    ]
}

impl Transform {
    pub fn identity() -> Transform {
        Transform {
            matrix: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        }
    }

    pub fn translate(x: f64, y: f64) -> Transform {
        Transform {
            matrix: [1.0, 0.0, 0.0, 1.0, x, y],
        }
    }

    pub fn scale(s: f64) -> Transform {
        Transform::scale_xy(s, s)
    }

    pub fn scale_xy(sx: f64, sy: f64) -> Transform {
        Transform {
            matrix: [sx, 0.0, 0.0, sy, 0.0, 0.0],
        }
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;
    fn mul(self, t: Self) -> Self {
        Transform {
            matrix: matrix_mul(&self.matrix, &t.matrix),
        }
    }
}

impl std::ops::Mul<Point> for Transform {
    type Output = Point;
    fn mul(self, v: Point) -> Point {
        Point {
            x: self.matrix[0] * v.x + self.matrix[2] * v.y + self.matrix[4],
            y: self.matrix[1] * v.x + self.matrix[3] * v.y + self.matrix[5],
        }
    }
}

#[test]
fn test_transform() {
    let a = Transform::identity();
    let b = Transform::identity();
    assert_eq!(a * b, Transform::identity());

    // Translation applied after scaling
    let t = Transform::translate(100.0, 50.0) * Transform::scale(10.0);
    assert_eq!(t * Point::new(3.0, 2.0), Point::new(130.0, 70.0));
    let t = Transform::scale_xy(2.0, -1.0) * Transform::translate(1.0, 1.0);
    assert_eq!(t * Point::new(0.0, 0.0), Point::new(2.0, -1.0));
}

#[test]
fn test_chebyshev() {
    assert_eq!(Point::new(-3.0, 2.0).chebyshev(), 3.0);
    assert_eq!(Point::new(1.0, -4.5).chebyshev(), 4.5);
}
