use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Color, FrequencyFrame, Paint, Point, RenderConfig, Surface};

use super::Canvas;

/// How dot particles move between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DotMotion {
    /// Only x moves; leaving the right edge wraps back to `0`.
    #[default]
    Wrap,
    /// Both axes move and reflect off the canvas edges.
    Bounce,
}

impl DotMotion {
    pub fn toggled(self) -> Self {
        match self {
            DotMotion::Wrap => DotMotion::Bounce,
            DotMotion::Bounce => DotMotion::Wrap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub color: Color,
}

impl Particle {
    /// Re-derives the speed from `radius`, keeping direction, then moves.
    pub fn advance(&mut self, radius: f32, motion: DotMotion, canvas: Canvas) {
        let speed = if radius == 0.0 { 1.0 } else { radius / 5.0 };
        self.dx = if self.dx > 0.0 { speed } else { -speed };
        self.dy = if self.dy > 0.0 { speed } else { -speed };

        match motion {
            DotMotion::Bounce => {
                if self.x >= canvas.width || self.x <= 0.0 {
                    self.dx = -self.dx;
                }
                if self.y >= canvas.height || self.y <= 0.0 {
                    self.dy = -self.dy;
                }
                self.x += self.dx;
                self.y += self.dy;
            }
            DotMotion::Wrap => {
                self.x += self.dx;
                if self.x > canvas.width {
                    self.x = 0.0;
                }
                if self.x < 0.0 {
                    self.dx = -self.dx;
                }
            }
        }
    }
}

/// One particle per bin plus the active motion submode.
#[derive(Debug, Clone, PartialEq)]
pub struct DotState {
    particles: Vec<Particle>,
    motion: DotMotion,
}

impl DotState {
    pub fn new(particles: Vec<Particle>, motion: DotMotion) -> Self {
        Self { particles, motion }
    }

    /// Places `count` particles at random positions with random colours.
    pub fn scatter(count: usize, canvas: Canvas, rng: &mut impl Rng) -> Self {
        let max_x = canvas.width.max(0.0) as u32;
        let max_y = canvas.height.max(0.0) as u32;
        let particles = (0..count)
            .map(|_| Particle {
                x: rng.gen_range(0..=max_x) as f32,
                y: rng.gen_range(0..=max_y) as f32,
                dx: rng.gen_range(1..=4) as f32,
                dy: rng.gen_range(1..=4) as f32,
                color: Color::rgba(
                    rng.gen(),
                    rng.gen(),
                    rng.gen(),
                    (rng.gen_range(0..=10u32) * 255 / 10) as u8,
                ),
            })
            .collect();

        Self::new(particles, DotMotion::default())
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn motion(&self) -> DotMotion {
        self.motion
    }

    pub fn toggle_motion(&mut self) -> DotMotion {
        self.motion = self.motion.toggled();
        self.motion
    }

    pub(crate) fn draw<S: Surface>(
        &mut self,
        frame: &FrequencyFrame,
        surface: &mut S,
        canvas: Canvas,
        config: &RenderConfig,
    ) {
        let measure = config
            .dot_measure_max
            .min(canvas.width.min(canvas.height) / 10.0)
            .max(0.0);

        for (&magnitude, particle) in frame.bins().iter().zip(self.particles.iter_mut()) {
            let radius = f32::from(magnitude) / 255.0 * measure;
            let center = Point::new(particle.x, particle.y);

            if radius > 0.0 {
                let paint = Paint::Radial {
                    center,
                    radius,
                    inner: Color::WHITE,
                    outer: particle.color,
                };
                surface.fill_disc(center, radius, &paint);
            }

            particle.advance(radius, self.motion, canvas);
        }
    }
}
