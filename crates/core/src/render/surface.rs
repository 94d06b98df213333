use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Point at `distance` from `self` in direction `angle` (radians, y down).
    pub fn offset_polar(self, angle: f32, distance: f32) -> Self {
        Self::new(self.x + distance * angle.cos(), self.y + distance * angle.sin())
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }
}

/// Straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const GREEN: Color = Color::rgb(0, 128, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        Color::rgba(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}

/// How a filled shape is coloured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Paint {
    Solid(Color),
    /// Linear gradient along the y axis, stops given as `(offset, colour)`
    /// with offsets in `[0, 1]` from `top` to `bottom`.
    VerticalGradient {
        top: f32,
        bottom: f32,
        stops: Vec<(f32, Color)>,
    },
    /// Radial gradient from `inner` at `center` to `outer` at `radius`.
    Radial {
        center: Point,
        radius: f32,
        inner: Color,
        outer: Color,
    },
}

impl Paint {
    pub fn color_at(&self, point: Point) -> Color {
        match self {
            Paint::Solid(color) => *color,
            Paint::VerticalGradient { top, bottom, stops } => {
                let span = bottom - top;
                let t = if span.abs() <= f32::EPSILON {
                    0.0
                } else {
                    ((point.y - top) / span).clamp(0.0, 1.0)
                };
                gradient_at(stops, t)
            }
            Paint::Radial {
                center,
                radius,
                inner,
                outer,
            } => {
                if *radius <= 0.0 {
                    return *outer;
                }
                inner.lerp(*outer, center.distance(point) / radius)
            }
        }
    }
}

fn gradient_at(stops: &[(f32, Color)], t: f32) -> Color {
    let Some(&(first_offset, first)) = stops.first() else {
        return Color::TRANSPARENT;
    };
    if t <= first_offset {
        return first;
    }
    for pair in stops.windows(2) {
        let (from_offset, from) = pair[0];
        let (to_offset, to) = pair[1];
        if t <= to_offset {
            let span = to_offset - from_offset;
            if span <= f32::EPSILON {
                return to;
            }
            return from.lerp(to, (t - from_offset) / span);
        }
    }
    stops.last().map_or(first, |&(_, color)| color)
}

/// Pure 2D drawing target used by the visualisation renderer.
///
/// Coordinates are in pixels with the origin at the top-left corner and y
/// growing downwards. Angles are radians measured clockwise from the +x axis.
pub trait Surface {
    fn resize(&mut self, width: u32, height: u32);
    /// Makes every pixel fully transparent.
    fn clear(&mut self);
    fn fill_rect(&mut self, rect: Rect, paint: &Paint);
    fn fill_disc(&mut self, center: Point, radius: f32, paint: &Paint);
    fn stroke_line(&mut self, from: Point, to: Point, width: f32, color: Color);
    /// Destination-out pass: clears the circular sector between two angles.
    fn erase_wedge(&mut self, center: Point, radius: f32, start_angle: f32, end_angle: f32);
    /// Destination-out pass: clears a full disc.
    fn erase_disc(&mut self, center: Point, radius: f32);
}

/// One recorded drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    Clear,
    FillRect {
        rect: Rect,
        paint: Paint,
    },
    FillDisc {
        center: Point,
        radius: f32,
        paint: Paint,
    },
    StrokeLine {
        from: Point,
        to: Point,
        width: f32,
        color: Color,
    },
    EraseWedge {
        center: Point,
        radius: f32,
        start_angle: f32,
        end_angle: f32,
    },
    EraseDisc {
        center: Point,
        radius: f32,
    },
}

/// Surface that records commands instead of producing pixels. Clearing
/// drops everything recorded so far, so it always holds the last frame.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

impl Surface for DisplayList {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.commands.clear();
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        self.commands.push(DrawCommand::FillRect {
            rect,
            paint: paint.clone(),
        });
    }

    fn fill_disc(&mut self, center: Point, radius: f32, paint: &Paint) {
        self.commands.push(DrawCommand::FillDisc {
            center,
            radius,
            paint: paint.clone(),
        });
    }

    fn stroke_line(&mut self, from: Point, to: Point, width: f32, color: Color) {
        self.commands.push(DrawCommand::StrokeLine {
            from,
            to,
            width,
            color,
        });
    }

    fn erase_wedge(&mut self, center: Point, radius: f32, start_angle: f32, end_angle: f32) {
        self.commands.push(DrawCommand::EraseWedge {
            center,
            radius,
            start_angle,
            end_angle,
        });
    }

    fn erase_disc(&mut self, center: Point, radius: f32) {
        self.commands.push(DrawCommand::EraseDisc { center, radius });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_gradient_interpolates_between_stops() {
        let paint = Paint::VerticalGradient {
            top: 0.0,
            bottom: 100.0,
            stops: vec![(0.0, Color::RED), (0.5, Color::YELLOW), (1.0, Color::GREEN)],
        };

        assert_eq!(paint.color_at(Point::new(0.0, -10.0)), Color::RED);
        assert_eq!(paint.color_at(Point::new(0.0, 50.0)), Color::YELLOW);
        assert_eq!(paint.color_at(Point::new(0.0, 250.0)), Color::GREEN);
        assert_eq!(paint.color_at(Point::new(0.0, 25.0)), Color::rgb(255, 128, 0));
    }

    #[test]
    fn radial_gradient_fades_to_outer_colour() {
        let paint = Paint::Radial {
            center: Point::new(10.0, 10.0),
            radius: 10.0,
            inner: Color::WHITE,
            outer: Color::rgba(0, 0, 0, 0),
        };

        assert_eq!(paint.color_at(Point::new(10.0, 10.0)), Color::WHITE);
        assert_eq!(paint.color_at(Point::new(30.0, 10.0)), Color::rgba(0, 0, 0, 0));
    }

    #[test]
    fn display_list_keeps_only_the_latest_frame() {
        let mut list = DisplayList::new();
        list.resize(10, 20);
        list.clear();
        list.erase_disc(Point::default(), 1.0);
        list.clear();

        assert_eq!(list.size(), (10, 20));
        assert_eq!(list.commands(), &[DrawCommand::Clear]);
    }
}
