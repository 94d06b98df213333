/// Result alias that carries the custom [`PulseError`] type.
pub type Result<T> = std::result::Result<T, PulseError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// Free-form message for failures that do not warrant a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// A caller handed in a value the operation cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Audio bytes for a track could not be retrieved.
    #[error("failed to fetch `{track}`: {reason}")]
    Fetch { track: String, reason: String },
    /// The fetched payload could not be turned into playable audio.
    #[error("failed to decode audio: {reason}")]
    Decode { reason: String },
    /// Playback was requested before the signal graph was built.
    #[error("audio graph has not been built")]
    GraphNotBuilt,
    /// A single-use playback resource was started a second time.
    #[error("playback resource has already been started")]
    ResourceSpent,
    /// The audio device could not be opened or driven.
    #[error("audio output unavailable: {reason}")]
    Output { reason: String },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Fft(#[from] realfft::FftError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl PulseError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn fetch(track: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            track: track.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(reason: impl ToString) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    pub fn output(reason: impl ToString) -> Self {
        Self::Output {
            reason: reason.to_string(),
        }
    }
}

impl From<&str> for PulseError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PulseError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
