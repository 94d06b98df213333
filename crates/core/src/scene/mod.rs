use std::{fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{FrequencyFrame, PulseError, RenderConfig, Surface};

mod circle;
mod column;
mod dot;

pub use circle::{circle_segments, CircleSegment, CircleState};
pub use column::{step_cap, ColumnState};
pub use dot::{DotMotion, DotState, Particle};

/// Selectable visualisation style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationMode {
    #[default]
    Column,
    Dot,
    Circle,
}

impl VisualizationMode {
    pub const ALL: [VisualizationMode; 3] = [
        VisualizationMode::Column,
        VisualizationMode::Dot,
        VisualizationMode::Circle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VisualizationMode::Column => "column",
            VisualizationMode::Dot => "dot",
            VisualizationMode::Circle => "circle",
        }
    }
}

impl fmt::Display for VisualizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualizationMode {
    type Err = PulseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| PulseError::msg(format!("unknown visualization mode `{value}`")))
    }
}

/// Drawable area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }
}

/// Per-mode drawing state. Only the active mode's state exists.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualizationState {
    Column(ColumnState),
    Dot(DotState),
    Circle(CircleState),
}

impl VisualizationState {
    /// Fresh state for `mode`; dot particles are scattered with `rng`.
    pub fn init(
        mode: VisualizationMode,
        bin_count: usize,
        canvas: Canvas,
        rng: &mut impl Rng,
    ) -> Self {
        match mode {
            VisualizationMode::Column => Self::Column(ColumnState::new(bin_count)),
            VisualizationMode::Dot => Self::Dot(DotState::scatter(bin_count, canvas, rng)),
            VisualizationMode::Circle => Self::Circle(CircleState),
        }
    }

    pub fn mode(&self) -> VisualizationMode {
        match self {
            Self::Column(_) => VisualizationMode::Column,
            Self::Dot(_) => VisualizationMode::Dot,
            Self::Circle(_) => VisualizationMode::Circle,
        }
    }

    pub fn draw<S: Surface>(
        &mut self,
        frame: &FrequencyFrame,
        surface: &mut S,
        canvas: Canvas,
        config: &RenderConfig,
    ) {
        match self {
            Self::Column(state) => state.draw(frame, surface, canvas, config),
            Self::Dot(state) => state.draw(frame, surface, canvas, config),
            Self::Circle(state) => state.draw(frame, surface, canvas, config),
        }
    }
}
