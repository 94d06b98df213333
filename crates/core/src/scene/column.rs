use crate::{Color, FrequencyFrame, Paint, Rect, RenderConfig, Surface};

use super::Canvas;

/// Falling peak caps, one per bin.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnState {
    caps: Vec<f32>,
}

impl ColumnState {
    pub fn new(bin_count: usize) -> Self {
        Self {
            caps: vec![0.0; bin_count],
        }
    }

    pub fn caps(&self) -> &[f32] {
        &self.caps
    }

    pub(crate) fn draw<S: Surface>(
        &mut self,
        frame: &FrequencyFrame,
        surface: &mut S,
        canvas: Canvas,
        config: &RenderConfig,
    ) {
        let len = frame.len();
        if len == 0 {
            return;
        }

        let slot = (canvas.width / len as f32).floor();
        let bar_width = slot * 0.8;
        let cap_height = bar_width * 0.6;
        let paint = Paint::VerticalGradient {
            top: 0.0,
            bottom: canvas.height,
            stops: vec![(0.0, Color::RED), (0.5, Color::YELLOW), (1.0, Color::GREEN)],
        };

        for (i, (&magnitude, cap)) in frame.bins().iter().zip(self.caps.iter_mut()).enumerate() {
            let x = slot * i as f32;
            let bar = f32::from(magnitude) / 255.0 * canvas.height;

            if bar > 0.0 {
                surface.fill_rect(Rect::new(x, canvas.height - bar, bar_width, bar), &paint);
            }
            surface.fill_rect(
                Rect::new(x, canvas.height - *cap - cap_height, bar_width, cap_height),
                &paint,
            );

            *cap = step_cap(*cap, bar, canvas.height, config.decay_step, config.rise_margin);
        }
    }
}

/// One frame of cap physics: fall by `decay`, snap just above a taller bar,
/// never leave `[0, height]`.
pub fn step_cap(cap: f32, bar: f32, height: f32, decay: f32, margin: f32) -> f32 {
    let mut next = (cap - decay).max(0.0);
    if bar > 0.0 && next < bar + margin {
        next = bar + margin;
    }
    next.min(height).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DisplayList, DrawCommand};

    fn config() -> RenderConfig {
        RenderConfig::default()
    }

    #[test]
    fn caps_fall_by_decay_step_on_silence() {
        let mut state = ColumnState { caps: vec![50.0; 8] };
        let mut surface = DisplayList::new();

        state.draw(&FrequencyFrame::silent(8), &mut surface, Canvas::new(800, 600), &config());

        assert!(state.caps().iter().all(|&cap| cap == 45.0));
    }

    #[test]
    fn caps_snap_above_loud_bars() {
        let mut state = ColumnState::new(2);
        let mut surface = DisplayList::new();
        let frame = FrequencyFrame::new(vec![255, 51]);

        state.draw(&frame, &mut surface, Canvas::new(200, 500), &config());

        assert_eq!(state.caps()[0], 500.0);
        assert!((state.caps()[1] - 140.0).abs() < 1e-3);
    }

    #[test]
    fn caps_converge_to_zero_and_stay_in_range() {
        let mut state = ColumnState::new(4);
        let mut surface = DisplayList::new();
        let canvas = Canvas::new(400, 300);

        state.draw(&FrequencyFrame::new(vec![255; 4]), &mut surface, canvas, &config());
        for _ in 0..200 {
            state.draw(&FrequencyFrame::silent(4), &mut surface, canvas, &config());
            assert!(state
                .caps()
                .iter()
                .all(|&cap| (0.0..=canvas.height).contains(&cap)));
        }

        assert!(state.caps().iter().all(|&cap| cap == 0.0));
    }

    #[test]
    fn draws_bar_and_cap_per_loud_bin() {
        let mut state = ColumnState::new(4);
        let mut surface = DisplayList::new();

        state.draw(
            &FrequencyFrame::new(vec![255, 0, 0, 0]),
            &mut surface,
            Canvas::new(400, 255),
            &config(),
        );

        let rects: Vec<Rect> = surface
            .commands()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::FillRect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect();

        assert_eq!(rects.len(), 5);
        assert_eq!(rects[0], Rect::new(0.0, 0.0, 80.0, 255.0));
        assert_eq!(rects[2].x, 100.0);
    }

    #[test]
    fn step_cap_is_total() {
        assert_eq!(step_cap(0.0, 0.0, 0.0, 5.0, 40.0), 0.0);
        assert_eq!(step_cap(10.0, 0.0, 600.0, 50.0, 40.0), 0.0);
        assert_eq!(step_cap(0.0, 590.0, 600.0, 5.0, 40.0), 600.0);
        assert_eq!(step_cap(300.0, 100.0, 600.0, 5.0, 40.0), 295.0);
    }
}
