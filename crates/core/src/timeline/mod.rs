use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{FrequencyAnalyzer, FrequencyFrame, PulseError, Result, Surface, VisualizationRenderer};

/// Renderer shared between the animation loop and the UI layer.
pub type SharedRenderer<S> = Arc<Mutex<VisualizationRenderer<S>>>;

/// Callback run after every drawn frame with the frame number.
pub type FrameObserver<S> = Box<dyn FnMut(u64, &VisualizationRenderer<S>) + Send>;

/// Drives the per-frame loop: snapshot the analyzer, draw, repeat.
pub struct AnimationScheduler<S> {
    analyzer: FrequencyAnalyzer,
    renderer: SharedRenderer<S>,
    frame_period: Duration,
    observer: Option<FrameObserver<S>>,
    ticks: u64,
}

impl<S: Surface + Send + 'static> AnimationScheduler<S> {
    pub fn new(analyzer: FrequencyAnalyzer, renderer: SharedRenderer<S>, fps: u32) -> Self {
        Self {
            analyzer,
            renderer,
            frame_period: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            observer: None,
            ticks: 0,
        }
    }

    pub fn with_observer(
        mut self,
        observer: impl FnMut(u64, &VisualizationRenderer<S>) + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one frame synchronously and returns the snapshot it drew.
    pub fn tick(&mut self) -> Result<FrequencyFrame> {
        let frame = self.analyzer.snapshot()?;
        let mut renderer = lock_renderer(&self.renderer)?;
        renderer.draw(&frame);
        self.ticks += 1;

        if let Some(observer) = self.observer.as_mut() {
            observer(self.ticks, &*renderer);
        }
        Ok(frame)
    }

    /// Starts the loop on the tokio runtime. It runs until the handle is
    /// stopped or dropped, regardless of playback state.
    pub fn spawn(mut self) -> AnimationHandle {
        let period = self.frame_period;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = self.tick() {
                    tracing::error!(%err, "animation frame failed");
                }
            }
        });

        tracing::debug!(?period, "animation loop started");
        AnimationHandle { task }
    }
}

impl<S> fmt::Debug for AnimationScheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationScheduler")
            .field("frame_period", &self.frame_period)
            .field("ticks", &self.ticks)
            .finish()
    }
}

/// Owns the running animation loop.
#[derive(Debug)]
pub struct AnimationHandle {
    task: JoinHandle<()>,
}

impl AnimationHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Locks a shared renderer, mapping poisoning to a crate error.
pub fn lock_renderer<S>(
    renderer: &SharedRenderer<S>,
) -> Result<MutexGuard<'_, VisualizationRenderer<S>>> {
    renderer
        .lock()
        .map_err(|_| PulseError::msg("renderer has been poisoned"))
}
