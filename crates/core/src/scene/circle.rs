use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::{Color, FrequencyFrame, Point, RenderConfig, Surface};

use super::Canvas;

/// Half-width, in radians, of the gap cut into each ray.
const GAP_HALF_ANGLE: f32 = 0.01;

/// A single ray of the ring, measured from the canvas centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleSegment {
    pub angle: f32,
    pub length: f32,
}

/// Ray geometry for `frame`: bin `i` sits at `i * 360 / len` degrees and
/// reaches `min_radius + base_radius * m / 255` from the centre.
pub fn circle_segments(frame: &FrequencyFrame, config: &RenderConfig) -> Vec<CircleSegment> {
    let len = frame.len();
    if len == 0 {
        return Vec::new();
    }
    let step = TAU / len as f32;

    frame
        .bins()
        .iter()
        .enumerate()
        .map(|(i, &magnitude)| CircleSegment {
            angle: i as f32 * step,
            length: config.circle_min_radius
                + config.circle_base_radius * f32::from(magnitude) / 255.0,
        })
        .collect()
}

/// Ring mode keeps nothing between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircleState;

impl CircleState {
    pub(crate) fn draw<S: Surface>(
        &mut self,
        frame: &FrequencyFrame,
        surface: &mut S,
        canvas: Canvas,
        config: &RenderConfig,
    ) {
        let center = Point::new(canvas.width / 2.0, canvas.height / 2.0);
        let line_width = config.circle_line_width;

        for segment in circle_segments(frame, config) {
            let tip = center.offset_polar(segment.angle, segment.length);
            surface.stroke_line(center, tip, line_width, Color::YELLOW);
            surface.erase_wedge(
                center,
                segment.length - line_width,
                segment.angle - GAP_HALF_ANGLE,
                segment.angle + GAP_HALF_ANGLE,
            );
        }

        surface.erase_disc(center, config.circle_min_radius - line_width);
    }
}
