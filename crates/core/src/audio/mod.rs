use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::{AudioConfig, FrequencyAnalyzer, PulseError, Result};

mod device;

pub use device::{map_channels, DeviceOutput, OutputSpec, Remixer, SampleQueue};

/// Interleaved PCM produced by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Averages the channels of `frames` starting at frame `start`.
    pub fn downmix(&self, start: usize, frames: usize) -> Vec<f32> {
        let end = (start + frames).min(self.frames());
        if start >= end {
            return Vec::new();
        }
        self.samples[start * self.channels..end * self.channels]
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// Final destination of the signal path.
pub trait AudioOutput: Send + Sync {
    /// Receives one block of interleaved, gain-scaled samples.
    fn write(&self, block: &[f32], channels: usize, sample_rate: u32);
}

/// Output that discards everything it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn write(&self, _block: &[f32], _channels: usize, _sample_rate: u32) {}
}

/// Shared volume control. Reads and writes are lock-free.
#[derive(Debug, Default)]
pub struct GainStage {
    bits: AtomicU32,
}

impl GainStage {
    pub fn new(value: f32) -> Self {
        let stage = Self::default();
        stage.set(value);
        stage
    }

    /// Applies `value` clamped to `[0, 1]`. NaN leaves the gain untouched.
    pub fn set(&self, value: f32) {
        if value.is_nan() {
            tracing::warn!("ignoring NaN volume");
            return;
        }
        self.bits
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Long-lived signal path shared by every session:
/// source -> analyzer tap -> gain -> output.
#[derive(Clone)]
pub struct AudioGraph {
    analyzer: FrequencyAnalyzer,
    gain: Arc<GainStage>,
    output: Arc<dyn AudioOutput>,
    connections: Arc<AtomicUsize>,
    block_size: usize,
}

impl AudioGraph {
    pub fn new(config: &AudioConfig, volume: f32, output: Arc<dyn AudioOutput>) -> Result<Self> {
        if config.block_size == 0 {
            return Err(PulseError::InvalidInput("block size must be positive"));
        }
        Ok(Self {
            analyzer: FrequencyAnalyzer::new(config)?,
            gain: Arc::new(GainStage::new(volume)),
            output,
            connections: Arc::new(AtomicUsize::new(0)),
            block_size: config.block_size,
        })
    }

    pub fn analyzer(&self) -> &FrequencyAnalyzer {
        &self.analyzer
    }

    pub fn gain(&self) -> &GainStage {
        &self.gain
    }

    /// Number of sources currently connected upstream of the tap.
    pub fn connected_sources(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn connect(&self) -> Arc<Connection> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Arc::new(Connection {
            connections: self.connections.clone(),
            analyzer: self.analyzer.clone(),
            live: AtomicBool::new(true),
        })
    }
}

impl fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraph")
            .field("analyzer", &self.analyzer)
            .field("gain", &self.gain.value())
            .field("connections", &self.connected_sources())
            .field("block_size", &self.block_size)
            .finish()
    }
}

/// A source's place upstream of the tap. Shared between the source and its
/// pump task; whichever side finishes first releases it.
struct Connection {
    connections: Arc<AtomicUsize>,
    analyzer: FrequencyAnalyzer,
    live: AtomicBool,
}

impl Connection {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Detaches the source and leaves the tap silent. Idempotent.
    fn release(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        self.connections.fetch_sub(1, Ordering::SeqCst);
        if let Err(err) = self.analyzer.silence() {
            tracing::warn!(%err, "unable to silence analyzer tap");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

/// Upstream audio source for one session. Implementations are single-use:
/// once started (and possibly stopped) they can never be started again.
pub trait PlaybackResource: Send {
    fn start(&mut self, offset: Duration) -> Result<()>;
    /// Halts playback. Calling it on an idle or stopped resource does nothing.
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
}

enum SourceState {
    Fresh,
    Started {
        task: JoinHandle<()>,
        connection: Arc<Connection>,
    },
    Spent,
}

/// Streams a decoded buffer through the graph in real time.
pub struct BufferSource {
    buffer: Arc<DecodedAudio>,
    graph: AudioGraph,
    state: SourceState,
}

impl BufferSource {
    pub fn new(buffer: Arc<DecodedAudio>, graph: AudioGraph) -> Self {
        Self {
            buffer,
            graph,
            state: SourceState::Fresh,
        }
    }

    pub fn duration(&self) -> Duration {
        self.buffer.duration()
    }
}

impl PlaybackResource for BufferSource {
    fn start(&mut self, offset: Duration) -> Result<()> {
        if !matches!(self.state, SourceState::Fresh) {
            return Err(PulseError::ResourceSpent);
        }

        let start_frame = (offset.as_secs_f64() * f64::from(self.buffer.sample_rate)) as usize;
        let connection = self.graph.connect();
        let task = tokio::spawn(pump(
            self.buffer.clone(),
            self.graph.clone(),
            start_frame,
            connection.clone(),
        ));

        self.state = SourceState::Started { task, connection };
        Ok(())
    }

    fn stop(&mut self) {
        if !matches!(self.state, SourceState::Started { .. }) {
            return;
        }
        if let SourceState::Started { task, connection } =
            std::mem::replace(&mut self.state, SourceState::Spent)
        {
            task.abort();
            connection.release();
        }
    }

    fn is_playing(&self) -> bool {
        match &self.state {
            SourceState::Started { connection, .. } => connection.is_live(),
            _ => false,
        }
    }
}

impl Drop for BufferSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for BufferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            SourceState::Fresh => "fresh",
            SourceState::Started { .. } => "started",
            SourceState::Spent => "spent",
        };
        f.debug_struct("BufferSource")
            .field("frames", &self.buffer.frames())
            .field("state", &state)
            .finish()
    }
}

async fn pump(
    buffer: Arc<DecodedAudio>,
    graph: AudioGraph,
    mut cursor: usize,
    connection: Arc<Connection>,
) {
    let block = graph.block_size;
    let period = Duration::from_secs_f64(block as f64 / f64::from(buffer.sample_rate));
    let mut ticker = tokio::time::interval(period);
    let total = buffer.frames();
    let channels = buffer.channels;

    while cursor < total {
        ticker.tick().await;
        if !connection.is_live() {
            return;
        }
        let end = (cursor + block).min(total);

        let mono = buffer.downmix(cursor, end - cursor);
        if let Err(err) = graph.analyzer.push_while(&mono, || connection.is_live()) {
            tracing::warn!(%err, "analyzer tap rejected block");
        }

        let gain = graph.gain.value();
        let scaled: Vec<f32> = buffer.samples[cursor * channels..end * channels]
            .iter()
            .map(|sample| sample * gain)
            .collect();
        graph.output.write(&scaled, channels, buffer.sample_rate);

        cursor = end;
    }

    connection.release();
    tracing::debug!(frames = total, "buffer source drained");
}
