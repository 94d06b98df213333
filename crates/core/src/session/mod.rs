use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    AudioConfig, AudioDecoder, AudioGraph, AudioOutput, BufferSource, CoverArt, CoverDisplay,
    FrequencyAnalyzer, PlaybackResource, PulseError, Result, TrackFetcher,
};

/// Lifecycle of one playback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Loading,
    Decoding,
    Playing,
    Stopped,
    Cancelled,
    /// Fetch or decode failed before playback started.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Stopped | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// Observable view of the most recent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSession {
    pub generation: u64,
    pub track: String,
    pub state: SessionState,
}

/// How a playback request settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackOutcome {
    /// The track is now audible.
    Started(String),
    /// A newer request took over before this one could take effect.
    Superseded(String),
}

impl PlaybackOutcome {
    pub fn track(&self) -> &str {
        match self {
            PlaybackOutcome::Started(track) | PlaybackOutcome::Superseded(track) => track,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, PlaybackOutcome::Started(_))
    }
}

/// How long a request waits for cover art before playing without it.
pub const DEFAULT_PICTURE_TIMEOUT: Duration = Duration::from_secs(5);

struct ActiveSession {
    session: AudioSession,
    resource: Option<Box<dyn PlaybackResource>>,
}

impl ActiveSession {
    fn halt(&mut self, state: SessionState) {
        if let Some(mut resource) = self.resource.take() {
            resource.stop();
        }
        if !self.session.state.is_terminal() {
            self.session.state = state;
        }
    }
}

/// Owns the playback graph and serialises track switching.
///
/// Every request takes a new generation number. After each await point the
/// request re-checks that its generation is still the latest; if not it
/// returns [`PlaybackOutcome::Superseded`] without touching audio, the cover
/// or the session record. Superseded work is not aborted, only ignored.
pub struct AudioSessionManager {
    fetcher: Arc<dyn TrackFetcher>,
    decoder: Arc<dyn AudioDecoder>,
    display: Arc<dyn CoverDisplay>,
    output: Arc<dyn AudioOutput>,
    config: AudioConfig,
    picture_timeout: Duration,
    graph: OnceLock<AudioGraph>,
    generation: AtomicU64,
    current: Mutex<Option<ActiveSession>>,
}

impl AudioSessionManager {
    pub fn new(
        fetcher: Arc<dyn TrackFetcher>,
        decoder: Arc<dyn AudioDecoder>,
        display: Arc<dyn CoverDisplay>,
        output: Arc<dyn AudioOutput>,
        config: AudioConfig,
    ) -> Self {
        Self {
            fetcher,
            decoder,
            display,
            output,
            config,
            picture_timeout: DEFAULT_PICTURE_TIMEOUT,
            graph: OnceLock::new(),
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    /// Caps how long cover art may hold up playback. A picture that has not
    /// arrived in time is treated as absent.
    pub fn with_picture_timeout(mut self, timeout: Duration) -> Self {
        self.picture_timeout = timeout;
        self
    }

    /// Creates the shared tap -> gain -> output path. Later calls keep the
    /// existing graph.
    pub fn build_graph(&self, volume: f32) -> Result<&AudioGraph> {
        if let Some(graph) = self.graph.get() {
            return Ok(graph);
        }
        let graph = AudioGraph::new(&self.config, volume, self.output.clone())?;
        tracing::info!(volume, bin_count = self.config.bin_count, "audio graph built");
        Ok(self.graph.get_or_init(|| graph))
    }

    pub fn graph(&self) -> Option<&AudioGraph> {
        self.graph.get()
    }

    pub fn analyzer(&self) -> Option<&FrequencyAnalyzer> {
        self.graph.get().map(AudioGraph::analyzer)
    }

    /// Applies `level` to the gain stage; does nothing before the graph exists.
    pub fn set_volume(&self, level: f32) {
        match self.graph.get() {
            Some(graph) => graph.gain().set(level),
            None => tracing::debug!(level, "volume change before graph was built"),
        }
    }

    pub fn volume(&self) -> Option<f32> {
        self.graph.get().map(|graph| graph.gain().value())
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The most recent session, or `None` before the first request.
    pub fn session(&self) -> Option<AudioSession> {
        let current = self.lock_current().ok()?;
        current.as_ref().map(|active| {
            let mut session = active.session.clone();
            let drained = active
                .resource
                .as_ref()
                .map_or(false, |resource| !resource.is_playing());
            if session.state == SessionState::Playing && drained {
                session.state = SessionState::Stopped;
            }
            session
        })
    }

    pub fn state(&self) -> SessionState {
        self.session()
            .map_or(SessionState::Idle, |session| session.state)
    }

    /// Halts the playing resource, if any. Safe to call repeatedly.
    pub fn stop_current(&self) {
        match self.lock_current() {
            Ok(mut current) => {
                if let Some(active) = current.as_mut() {
                    if active.resource.is_some() {
                        tracing::info!(track = %active.session.track, "stopping playback");
                    }
                    active.halt(SessionState::Stopped);
                }
            }
            Err(err) => tracing::error!(%err, "unable to stop playback"),
        }
    }

    /// Loads, decodes and plays `track`, superseding any earlier request.
    pub async fn request_playback(&self, track: &str) -> Result<PlaybackOutcome> {
        let graph = self.graph.get().ok_or(PulseError::GraphNotBuilt)?.clone();
        let generation = self.begin(track)?;
        tracing::info!(track, generation, "playback requested");

        let (audio, picture) = tokio::join!(
            self.fetcher.fetch_audio(track),
            tokio::time::timeout(self.picture_timeout, self.fetcher.fetch_picture(track))
        );
        if !self.is_current(generation) {
            return Ok(self.superseded(track, generation, "fetch"));
        }

        let payload = match audio {
            Ok(payload) => payload,
            Err(err) => return self.fail(track, generation, err),
        };
        let picture = match picture {
            Ok(Ok(picture)) => picture,
            Ok(Err(err)) => {
                tracing::warn!(track, %err, "cover art unavailable");
                None
            }
            Err(_) => {
                tracing::warn!(track, timeout = ?self.picture_timeout, "cover art timed out");
                None
            }
        };

        self.transition(generation, SessionState::Decoding)?;
        let decoded = self.decoder.decode(payload).await;
        if !self.is_current(generation) {
            return Ok(self.superseded(track, generation, "decode"));
        }

        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(err) => return self.fail(track, generation, err),
        };

        let source = BufferSource::new(Arc::new(decoded), graph);
        self.commit(track, generation, source, picture)
    }

    fn begin(&self, track: &str) -> Result<u64> {
        let mut current = self.lock_current()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(previous) = current.as_mut() {
            previous.halt(SessionState::Cancelled);
        }
        *current = Some(ActiveSession {
            session: AudioSession {
                generation,
                track: track.to_string(),
                state: SessionState::Loading,
            },
            resource: None,
        });
        Ok(generation)
    }

    fn transition(&self, generation: u64, state: SessionState) -> Result<()> {
        let mut current = self.lock_current()?;
        if let Some(active) = current
            .as_mut()
            .filter(|active| active.session.generation == generation)
        {
            tracing::debug!(
                track = %active.session.track,
                generation,
                ?state,
                "session transition"
            );
            active.session.state = state;
        }
        Ok(())
    }

    /// Starts `source` and shows the cover, but only if `generation` is
    /// still the latest request. Checked and applied under one lock.
    fn commit(
        &self,
        track: &str,
        generation: u64,
        mut source: BufferSource,
        picture: Option<CoverArt>,
    ) -> Result<PlaybackOutcome> {
        let mut current = self.lock_current()?;
        let active = match current.as_mut() {
            Some(active) if self.is_current(generation) => active,
            _ => return Ok(self.superseded(track, generation, "commit")),
        };

        source.start(Duration::ZERO)?;
        if let Some(picture) = picture {
            self.display.show(&picture);
        }

        tracing::info!(track, generation, duration = ?source.duration(), "playing");
        active.resource = Some(Box::new(source));
        active.session.state = SessionState::Playing;
        Ok(PlaybackOutcome::Started(track.to_string()))
    }

    fn fail(&self, track: &str, generation: u64, err: PulseError) -> Result<PlaybackOutcome> {
        let mut current = self.lock_current()?;
        match current.as_mut() {
            Some(active) if self.is_current(generation) => {
                tracing::error!(track, generation, %err, "playback failed");
                active.session.state = SessionState::Failed;
                Err(err)
            }
            _ => Ok(self.superseded(track, generation, "failure")),
        }
    }

    fn superseded(&self, track: &str, generation: u64, stage: &str) -> PlaybackOutcome {
        tracing::debug!(track, generation, stage, "request superseded");
        PlaybackOutcome::Superseded(track.to_string())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn lock_current(&self) -> Result<MutexGuard<'_, Option<ActiveSession>>> {
        self.current
            .lock()
            .map_err(|_| PulseError::msg("session state has been poisoned"))
    }
}

impl fmt::Debug for AudioSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSessionManager")
            .field("generation", &self.current_generation())
            .field("graph", &self.graph.get())
            .field("session", &self.session())
            .finish()
    }
}
