//! Core library for the Music Pulse player.
//!
//! Each module owns one subsystem: fetching and decoding tracks, the shared
//! playback graph with its spectrum tap, session switching, the per-mode
//! visualisation state and the animation loop that ties the tap to the
//! renderer. Host layers (HTTP server, UI wiring) stay outside the crate and
//! only call the public operations exposed here.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod record;
pub mod render;
pub mod scene;
pub mod session;
pub mod timeline;

pub use analysis::{FrequencyAnalyzer, FrequencyFrame};
pub use assets::{CoverArt, CoverDisplay, CoverSlot};
pub use audio::{
    AudioGraph, AudioOutput, BufferSource, DecodedAudio, DeviceOutput, GainStage, NullOutput,
    OutputSpec, PlaybackResource,
};
pub use config::{AppConfig, AudioConfig, RenderConfig, SourceConfig};
pub use decode::{AudioDecoder, SymphoniaDecoder};
pub use error::{PulseError, Result};
pub use fetch::{track_id_from_file_name, FileTrackFetcher, HttpTrackFetcher, TrackFetcher};
pub use record::{Recorder, RecordingSettings};
pub use render::{
    Color, DisplayList, DrawCommand, Paint, Point, RasterSurface, Rect, Surface,
    VisualizationRenderer,
};
pub use scene::{
    circle_segments, step_cap, Canvas, CircleSegment, CircleState, ColumnState, DotMotion,
    DotState, Particle, VisualizationMode, VisualizationState,
};
pub use session::{
    AudioSession, AudioSessionManager, PlaybackOutcome, SessionState, DEFAULT_PICTURE_TIMEOUT,
};
pub use timeline::{
    lock_renderer, AnimationHandle, AnimationScheduler, FrameObserver, SharedRenderer,
};
