use std::{
    collections::VecDeque,
    sync::{mpsc, Arc, Mutex},
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{AudioOutput, PulseError, Result};

/// Sample rate and channel layout of an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Interleaved samples waiting for the device callback.
///
/// Bounded: when a push would overflow, the oldest whole frames are dropped.
#[derive(Debug)]
pub struct SampleQueue {
    samples: Mutex<VecDeque<f32>>,
    channels: usize,
    capacity: usize,
}

impl SampleQueue {
    pub fn new(frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        let capacity = frames.max(1) * channels;
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            channels,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map_or(0, |samples| samples.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, block: &[f32]) {
        let Ok(mut samples) = self.samples.lock() else {
            return;
        };
        samples.extend(block.iter().copied());

        let overflow = samples.len().saturating_sub(self.capacity);
        if overflow > 0 {
            let whole_frames = overflow.div_ceil(self.channels) * self.channels;
            let len = samples.len();
            samples.drain(..whole_frames.min(len));
        }
    }

    /// Fills `out` from the front of the queue, padding with silence once it
    /// runs dry. Returns how many queued samples were used.
    pub fn fill<T>(&self, out: &mut [T]) -> usize
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let Ok(mut samples) = self.samples.lock() else {
            out.iter_mut().for_each(|slot| *slot = T::EQUILIBRIUM);
            return 0;
        };

        let mut provided = 0;
        for slot in out.iter_mut() {
            *slot = match samples.pop_front() {
                Some(sample) => {
                    provided += 1;
                    T::from_sample(sample.clamp(-1.0, 1.0))
                }
                None => T::EQUILIBRIUM,
            };
        }
        provided
    }
}

/// Converts blocks from whatever layout a track decodes to into the device
/// layout. Rates are linearly interpolated; the fractional read position and
/// the last frame carry over between blocks so block edges stay continuous.
#[derive(Debug)]
pub struct Remixer {
    target: OutputSpec,
    source: Option<(usize, u32)>,
    position: f64,
    previous: Vec<f32>,
}

impl Remixer {
    pub fn new(target: OutputSpec) -> Self {
        Self {
            target,
            source: None,
            position: 0.0,
            previous: Vec::new(),
        }
    }

    pub fn target(&self) -> OutputSpec {
        self.target
    }

    pub fn process(&mut self, block: &[f32], channels: usize, sample_rate: u32) -> Vec<f32> {
        let channels = channels.max(1);
        if self.source != Some((channels, sample_rate)) {
            self.source = Some((channels, sample_rate));
            self.position = 0.0;
            self.previous.clear();
        }

        let mapped = map_channels(block, channels, usize::from(self.target.channels.max(1)));
        if sample_rate == self.target.sample_rate || sample_rate == 0 {
            return mapped;
        }
        self.resample(mapped, sample_rate)
    }

    fn resample(&mut self, mapped: Vec<f32>, sample_rate: u32) -> Vec<f32> {
        let channels = usize::from(self.target.channels.max(1));
        let step = f64::from(sample_rate) / f64::from(self.target.sample_rate.max(1));

        let mut joined = std::mem::take(&mut self.previous);
        joined.extend_from_slice(&mapped);
        let total = joined.len() / channels;

        let mut out = Vec::with_capacity((mapped.len() as f64 / step) as usize + channels);
        loop {
            let index = self.position.floor() as usize;
            if index + 1 >= total {
                break;
            }
            let fraction = (self.position - index as f64) as f32;
            let (from, to) = (index * channels, (index + 1) * channels);
            for channel in 0..channels {
                let a = joined[from + channel];
                let b = joined[to + channel];
                out.push(a + (b - a) * fraction);
            }
            self.position += step;
        }

        if total > 0 {
            self.position -= (total - 1) as f64;
            self.previous = joined[(total - 1) * channels..].to_vec();
        }
        out
    }
}

/// Maps interleaved frames between channel counts: mono targets average,
/// mono sources are duplicated, anything else keeps matching channels and
/// repeats or drops the rest.
pub fn map_channels(block: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 {
        return block.to_vec();
    }

    let mut out = Vec::with_capacity(block.len() / from * to);
    for frame in block.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|channel| frame[channel % from]));
        }
    }
    out
}

/// Plays the signal path on the default output device through `cpal`.
///
/// The stream is owned by a dedicated thread since `cpal::Stream` is not
/// `Send` on every host; [`AudioOutput::write`] only touches the shared queue.
pub struct DeviceOutput {
    queue: Arc<SampleQueue>,
    remixer: Mutex<Remixer>,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DeviceOutput {
    /// Opens the default device, queueing at most `buffer` of audio ahead of it.
    pub fn open_default(buffer: Duration) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match open_stream(buffer) {
                    Ok((stream, spec, queue)) => {
                        let _ = ready_tx.send(Ok((spec, queue)));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                // Holds the stream open until the output is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })?;

        let (spec, queue) = ready_rx
            .recv()
            .map_err(|_| PulseError::output("output thread exited before opening a stream"))??;

        Ok(Self {
            queue,
            remixer: Mutex::new(Remixer::new(spec)),
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn spec(&self) -> Option<OutputSpec> {
        self.remixer.lock().ok().map(|remixer| remixer.target())
    }

    /// Samples queued but not yet consumed by the device.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl AudioOutput for DeviceOutput {
    fn write(&self, block: &[f32], channels: usize, sample_rate: u32) {
        let converted = match self.remixer.lock() {
            Ok(mut remixer) => remixer.process(block, channels, sample_rate),
            Err(_) => return,
        };
        self.queue.push(&converted);
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        if let Ok(mut shutdown) = self.shutdown.lock() {
            shutdown.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(worker) = worker {
            if worker.join().is_err() {
                tracing::warn!("audio output thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for DeviceOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceOutput")
            .field("spec", &self.spec())
            .field("queued", &self.queued())
            .finish()
    }
}

fn open_stream(buffer: Duration) -> Result<(cpal::Stream, OutputSpec, Arc<SampleQueue>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PulseError::output("no default output device"))?;
    let supported = device.default_output_config().map_err(PulseError::output)?;

    let spec = OutputSpec {
        sample_rate: supported.sample_rate(),
        channels: supported.channels(),
    };
    let frames = (buffer.as_secs_f64() * f64::from(spec.sample_rate)) as usize;
    let queue = Arc::new(SampleQueue::new(frames, usize::from(spec.channels)));

    let config: cpal::StreamConfig = supported.clone().into();
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, queue.clone())?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, queue.clone())?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, queue.clone())?,
        other => {
            return Err(PulseError::output(format!(
                "unsupported sample format {other:?}"
            )))
        }
    };
    stream.play().map_err(PulseError::output)?;

    tracing::info!(
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        "audio output opened"
    );
    Ok((stream, spec, queue))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<SampleQueue>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                queue.fill(data);
            },
            |err| tracing::error!(%err, "audio output stream error"),
            Some(Duration::from_millis(200)),
        )
        .map_err(PulseError::output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drops_oldest_whole_frames_on_overflow() {
        let queue = SampleQueue::new(2, 2);
        queue.push(&[1.0, 1.0, 2.0, 2.0]);
        queue.push(&[3.0, 3.0]);

        let mut out = [0.0f32; 6];
        assert_eq!(queue.fill(&mut out), 4);
        assert_eq!(out, [2.0, 2.0, 3.0, 3.0, 0.0, 0.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_converts_and_clamps_integer_samples() {
        let queue = SampleQueue::new(8, 1);
        queue.push(&[2.0, -2.0, 0.0]);

        let mut out = [7i16; 4];
        queue.fill(&mut out);
        assert_eq!(out[0], i16::MAX);
        assert!(out[1] <= -i16::MAX);
        assert_eq!(out[2..], [0i16, 0]);
    }

    #[test]
    fn channels_are_averaged_or_duplicated() {
        assert_eq!(map_channels(&[1.0, 0.0, 0.5, 0.5], 2, 1), vec![0.5, 0.5]);
        assert_eq!(map_channels(&[0.25, 0.75], 1, 2), vec![0.25, 0.25, 0.75, 0.75]);
        assert_eq!(map_channels(&[1.0, 2.0, 3.0], 3, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn downsampling_stays_continuous_across_blocks() {
        let mut remixer = Remixer::new(OutputSpec {
            sample_rate: 100,
            channels: 1,
        });

        let first = remixer.process(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0], 1, 200);
        let second = remixer.process(&[6.0, 7.0, 8.0, 9.0], 1, 200);

        assert_eq!(first, vec![0.0, 2.0, 4.0]);
        assert_eq!(second, vec![6.0, 8.0]);
    }

    #[test]
    fn upsampling_interpolates_between_frames() {
        let mut remixer = Remixer::new(OutputSpec {
            sample_rate: 200,
            channels: 2,
        });

        let out = remixer.process(&[0.0, 1.0, 2.0], 1, 100);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 1.5, 1.5]);

        let out = remixer.process(&[3.0], 1, 100);
        assert_eq!(out, vec![2.0, 2.0, 2.5, 2.5]);
    }

    #[test]
    fn matching_layout_passes_through() {
        let mut remixer = Remixer::new(OutputSpec {
            sample_rate: 48_000,
            channels: 2,
        });
        let block = [0.1, -0.1, 0.2, -0.2];
        assert_eq!(remixer.process(&block, 2, 48_000), block.to_vec());
    }
}
