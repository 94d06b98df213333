use std::{f32::consts::PI, ops::Range, path::Path};

use image::{ImageFormat, RgbaImage};

use super::{Color, Paint, Point, Rect, Surface};
use crate::Result;

/// Software rasteriser backed by an RGBA image buffer.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.image.width() || y >= self.image.height() {
            return None;
        }
        let [r, g, b, a] = self.image.get_pixel(x, y).0;
        Some(Color::rgba(r, g, b, a))
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    /// Pixel ranges covering `[x0, x1) x [y0, y1)` clipped to the image.
    fn clip(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> (Range<u32>, Range<u32>) {
        let clamp_x = |v: f32| v.clamp(0.0, self.image.width() as f32) as u32;
        let clamp_y = |v: f32| v.clamp(0.0, self.image.height() as f32) as u32;
        (
            clamp_x(x0.floor())..clamp_x(x1.ceil()),
            clamp_y(y0.floor())..clamp_y(y1.ceil()),
        )
    }

    fn paint_where(
        &mut self,
        (xs, ys): (Range<u32>, Range<u32>),
        paint: &Paint,
        inside: impl Fn(Point) -> bool,
    ) {
        for y in ys {
            for x in xs.clone() {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if inside(center) {
                    let pixel = self.image.get_pixel_mut(x, y);
                    pixel.0 = blend(pixel.0, paint.color_at(center));
                }
            }
        }
    }

    fn erase_where(&mut self, (xs, ys): (Range<u32>, Range<u32>), inside: impl Fn(Point) -> bool) {
        for y in ys {
            for x in xs.clone() {
                if inside(Point::new(x as f32 + 0.5, y as f32 + 0.5)) {
                    self.image.get_pixel_mut(x, y).0 = [0, 0, 0, 0];
                }
            }
        }
    }
}

impl Surface for RasterSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        self.image.pixels_mut().for_each(|pixel| pixel.0 = [0, 0, 0, 0]);
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return;
        }
        let bounds = self.clip(rect.x, rect.y, rect.x + rect.width, rect.y + rect.height);
        self.paint_where(bounds, paint, |p| rect.contains(p));
    }

    fn fill_disc(&mut self, center: Point, radius: f32, paint: &Paint) {
        if radius <= 0.0 {
            return;
        }
        let bounds = self.clip(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        );
        self.paint_where(bounds, paint, |p| p.distance(center) <= radius);
    }

    fn stroke_line(&mut self, from: Point, to: Point, width: f32, color: Color) {
        let half = width / 2.0;
        if half <= 0.0 {
            return;
        }
        let bounds = self.clip(
            from.x.min(to.x) - half,
            from.y.min(to.y) - half,
            from.x.max(to.x) + half,
            from.y.max(to.y) + half,
        );
        self.paint_where(bounds, &Paint::Solid(color), |p| {
            distance_to_segment(p, from, to) <= half
        });
    }

    fn erase_wedge(&mut self, center: Point, radius: f32, start_angle: f32, end_angle: f32) {
        if radius <= 0.0 || end_angle <= start_angle {
            return;
        }
        let mid = (start_angle + end_angle) / 2.0;
        let half = (end_angle - start_angle) / 2.0;
        let bounds = self.clip(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        );
        self.erase_where(bounds, |p| {
            if p.distance(center) > radius {
                return false;
            }
            let angle = (p.y - center.y).atan2(p.x - center.x);
            wrap_angle(angle - mid).abs() <= half
        });
    }

    fn erase_disc(&mut self, center: Point, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        let bounds = self.clip(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        );
        self.erase_where(bounds, |p| p.distance(center) <= radius);
    }
}

/// Source-over compositing of straight-alpha colours.
fn blend(dst: [u8; 4], src: Color) -> [u8; 4] {
    let sa = f32::from(src.a) / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |s: u8, d: u8| {
        ((f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a).round() as u8
    };
    [
        channel(src.r, dst[0]),
        channel(src.g, dst[1]),
        channel(src.b, dst[2]),
        (out_a * 255.0).round() as u8,
    ]
}

fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}
