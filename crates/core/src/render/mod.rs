use std::fmt;

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    scene::{Canvas, DotMotion, VisualizationMode, VisualizationState},
    FrequencyFrame, RenderConfig,
};

mod raster;
mod surface;

pub use raster::RasterSurface;
pub use surface::{Color, DisplayList, DrawCommand, Paint, Point, Rect, Surface};

/// Draws frequency frames onto a surface in one of the visualisation modes.
///
/// The renderer exclusively owns the per-mode state: caps and particles
/// persist across frames and track changes, and are only rebuilt by
/// [`VisualizationRenderer::set_mode`] and [`VisualizationRenderer::resize`].
pub struct VisualizationRenderer<S> {
    surface: S,
    config: RenderConfig,
    bin_count: usize,
    canvas: Canvas,
    state: VisualizationState,
    rng: StdRng,
    frames_drawn: u64,
}

impl<S: Surface> VisualizationRenderer<S> {
    pub fn new(surface: S, config: RenderConfig, bin_count: usize) -> Self {
        Self::with_rng(surface, config, bin_count, StdRng::from_entropy())
    }

    /// Uses a caller-provided generator for particle placement.
    pub fn with_rng(
        mut surface: S,
        config: RenderConfig,
        bin_count: usize,
        mut rng: StdRng,
    ) -> Self {
        surface.resize(config.width, config.height);
        let canvas = Canvas::new(config.width, config.height);
        let state = VisualizationState::init(config.mode, bin_count, canvas, &mut rng);

        Self {
            surface,
            config,
            bin_count,
            canvas,
            state,
            rng,
            frames_drawn: 0,
        }
    }

    pub fn mode(&self) -> VisualizationMode {
        self.state.mode()
    }

    pub fn state(&self) -> &VisualizationState {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Switches mode, discarding the previous mode's state.
    pub fn set_mode(&mut self, mode: VisualizationMode) {
        tracing::debug!(%mode, "switching visualization mode");
        self.config.mode = mode;
        self.reset_state();
    }

    /// Flips the dot motion submode. Ignored outside dot mode.
    pub fn toggle_dot_motion(&mut self) -> Option<DotMotion> {
        match &mut self.state {
            VisualizationState::Dot(dots) => Some(dots.toggle_motion()),
            _ => None,
        }
    }

    /// Adopts new canvas dimensions and reinitialises the active mode.
    pub fn resize(&mut self, width: u32, height: u32) {
        tracing::debug!(width, height, "resizing canvas");
        self.config.width = width;
        self.config.height = height;
        self.canvas = Canvas::new(width, height);
        self.surface.resize(width, height);
        self.reset_state();
    }

    /// Clears the surface and renders exactly one frame.
    pub fn draw(&mut self, frame: &FrequencyFrame) {
        self.surface.clear();
        self.state
            .draw(frame, &mut self.surface, self.canvas, &self.config);
        self.frames_drawn += 1;
    }

    fn reset_state(&mut self) {
        self.state =
            VisualizationState::init(self.config.mode, self.bin_count, self.canvas, &mut self.rng);
    }
}

impl<S> fmt::Debug for VisualizationRenderer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizationRenderer")
            .field("mode", &self.state.mode())
            .field("canvas", &self.canvas)
            .field("bin_count", &self.bin_count)
            .field("frames_drawn", &self.frames_drawn)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(mode: VisualizationMode) -> VisualizationRenderer<DisplayList> {
        let config = RenderConfig {
            width: 320,
            height: 240,
            mode,
            ..Default::default()
        };
        VisualizationRenderer::with_rng(DisplayList::new(), config, 16, StdRng::seed_from_u64(1))
    }

    #[test]
    fn starts_in_configured_mode_with_sized_surface() {
        let renderer = renderer(VisualizationMode::Dot);
        assert_eq!(renderer.mode(), VisualizationMode::Dot);
        assert_eq!(renderer.surface().size(), (320, 240));
    }

    #[test]
    fn every_draw_starts_with_a_clear() {
        let mut renderer = renderer(VisualizationMode::Column);
        renderer.draw(&FrequencyFrame::new(vec![128; 16]));
        renderer.draw(&FrequencyFrame::silent(16));

        let commands = renderer.surface().commands();
        assert_eq!(commands[0], DrawCommand::Clear);
        assert_eq!(
            commands.iter().filter(|c| **c == DrawCommand::Clear).count(),
            1
        );
        assert_eq!(renderer.frames_drawn(), 2);
    }

    #[test]
    fn click_toggles_only_in_dot_mode() {
        let mut renderer = renderer(VisualizationMode::Column);
        assert_eq!(renderer.toggle_dot_motion(), None);

        renderer.set_mode(VisualizationMode::Dot);
        assert_eq!(renderer.toggle_dot_motion(), Some(DotMotion::Bounce));
        assert_eq!(renderer.toggle_dot_motion(), Some(DotMotion::Wrap));
    }

    #[test]
    fn set_mode_discards_previous_state() {
        let mut renderer = renderer(VisualizationMode::Column);
        renderer.draw(&FrequencyFrame::new(vec![255; 16]));

        renderer.set_mode(VisualizationMode::Circle);
        renderer.set_mode(VisualizationMode::Column);

        match renderer.state() {
            VisualizationState::Column(columns) => {
                assert!(columns.caps().iter().all(|&cap| cap == 0.0))
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn resize_reinitialises_particles() {
        let mut renderer = renderer(VisualizationMode::Dot);
        renderer.toggle_dot_motion();
        let before = renderer.state().clone();

        renderer.resize(100, 50);

        assert_eq!(renderer.surface().size(), (100, 50));
        assert_ne!(renderer.state(), &before);
        match renderer.state() {
            VisualizationState::Dot(dots) => {
                assert_eq!(dots.motion(), DotMotion::Wrap);
                assert!(dots.particles().iter().all(|p| p.x <= 100.0 && p.y <= 50.0));
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn drawing_is_total_over_extreme_and_mismatched_frames() {
        for mode in VisualizationMode::ALL {
            let mut renderer = renderer(mode);
            renderer.draw(&FrequencyFrame::silent(16));
            renderer.draw(&FrequencyFrame::new(vec![255; 16]));
            renderer.draw(&FrequencyFrame::new(vec![255; 3]));
            renderer.draw(&FrequencyFrame::new(vec![7; 40]));
            renderer.draw(&FrequencyFrame::default());
        }
    }

    #[test]
    fn zero_sized_canvas_is_handled() {
        let mut renderer = renderer(VisualizationMode::Dot);
        renderer.resize(0, 0);
        renderer.draw(&FrequencyFrame::new(vec![255; 16]));
        renderer.set_mode(VisualizationMode::Column);
        renderer.draw(&FrequencyFrame::new(vec![255; 16]));
    }
}
