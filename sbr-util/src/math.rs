use std::ops::{Add, Div, Mul, Neg, Sub};

mod curve;
mod num;
mod outline;

pub use curve::{evaluate_bezier, Bezier, CubicBezier, QuadraticBezier};
pub use num::{Number, Signed, Sqrt};
pub use outline::{Outline, OutlineBuilder, Segment, SegmentDegree};

pub type Point2f = Point2<f32>;
pub type Vec2f = Vec2<f32>;
pub type Rect2f = Rect2<f32>;

#[derive(Clone, Copy, PartialEq)]
pub struct Point2<N> {
    pub x: N,
    pub y: N,
}

impl<N: Number> Point2<N> {
    pub const fn new(x: N, y: N) -> Self {
        Self { x, y }
    }

    pub fn to_vec(self) -> Vec2<N> {
        Vec2::new(self.x, self.y)
    }

    pub fn midpoint(self, other: Self) -> Self {
        ((self.to_vec() + other.to_vec()) / (N::ONE + N::ONE)).to_point()
    }
}

impl<N: std::fmt::Debug> std::fmt::Debug for Point2<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?}, {:?})", self.x, self.y)
    }
}

impl<N: Number> Sub for Point2<N> {
    type Output = Vec2<N>;
    fn sub(self, rhs: Self) -> Vec2<N> {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<N: Number> Add<Vec2<N>> for Point2<N> {
    type Output = Point2<N>;
    fn add(self, rhs: Vec2<N>) -> Point2<N> {
        Point2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<N: Number + Signed> Sub<Vec2<N>> for Point2<N> {
    type Output = Point2<N>;
    fn sub(self, rhs: Vec2<N>) -> Point2<N> {
        Point2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Clone, Copy, PartialEq)]
pub struct Vec2<N> {
    pub x: N,
    pub y: N,
}

impl<N: Number> Vec2<N> {
    pub const fn new(x: N, y: N) -> Self {
        Self { x, y }
    }

    pub fn to_point(self) -> Point2<N> {
        Point2::new(self.x, self.y)
    }

    pub fn length_sq(self) -> N {
        self.x * self.x + self.y * self.y
    }
}

impl<N: Sqrt> Vec2<N> {
    pub fn length(self) -> N {
        self.length_sq().sqrt()
    }

    pub fn normalize(self) -> Self {
        N::fast_normalize(self)
    }
}

impl<N: std::fmt::Debug> std::fmt::Debug for Vec2<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:?}, {:?}>", self.x, self.y)
    }
}

impl<N: Number> Add for Vec2<N> {
    type Output = Vec2<N>;
    fn add(self, rhs: Self) -> Vec2<N> {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<N: Number + Signed> Sub for Vec2<N> {
    type Output = Vec2<N>;
    fn sub(self, rhs: Self) -> Vec2<N> {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<N: Number + Signed> Neg for Vec2<N> {
    type Output = Vec2<N>;
    fn neg(self) -> Vec2<N> {
        Vec2::new(-self.x, -self.y)
    }
}

impl<N: Number> Mul<N> for Vec2<N> {
    type Output = Vec2<N>;
    fn mul(self, rhs: N) -> Vec2<N> {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl<N: Number> Div<N> for Vec2<N> {
    type Output = Vec2<N>;
    fn div(self, rhs: N) -> Vec2<N> {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

/// Fast reciprocal-sqrt based normalization, falling back to plain division
/// for non-`f32` number types that do not have a fast-path `Sqrt` impl.
pub fn fast_divide_by_sqrt<N: Sqrt>(vector: Vec2<N>, length_sq: N) -> Vec2<N> {
    vector / length_sq.sqrt()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect2<N> {
    pub min: Point2<N>,
    pub max: Point2<N>,
}

impl Rect2<f32> {
    pub const NOTHING: Self = Self {
        min: Point2::new(f32::INFINITY, f32::INFINITY),
        max: Point2::new(f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    pub const ZERO: Self = Self {
        min: Point2::new(0.0, 0.0),
        max: Point2::new(0.0, 0.0),
    };

    pub fn is_negative(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn expand_to_point(&mut self, point: Point2f) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    pub fn size(&self) -> Vec2f {
        self.max - self.min
    }

    pub fn area(&self) -> f32 {
        if self.is_negative() {
            0.0
        } else {
            let size = self.size();
            size.x * size.y
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn bounding_from_points(points: impl IntoIterator<Item = Point2f>) -> Self {
        let mut rect = Self::NOTHING;
        for point in points {
            rect.expand_to_point(point);
        }
        rect
    }
}
