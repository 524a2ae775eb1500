//! Typed PDF user-space geometry, shared by the document facade and the form
//! appearance generator.

/// The PDF default user space unit (1/72 inch).
pub struct Pt;

pub type Point = euclid::TypedPoint2D<f64, Pt>;
pub type Size = euclid::TypedSize2D<f64, Pt>;
pub type Rect = euclid::TypedRect<f64, Pt>;

pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Rect {
    Rect::new(Point::new(x, y), Size::new(width, height))
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    pub fn gray(level: f64) -> Self {
        Rgb { r: level, g: level, b: level }
    }
}
