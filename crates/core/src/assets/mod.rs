use std::sync::{Mutex, MutexGuard};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{PulseError, Result};

/// Embedded cover art as served by the picture endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverArt {
    /// MIME type (`image/jpeg`) or bare subtype (`jpeg`).
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl CoverArt {
    /// Parses a picture response body. Empty bodies, `null` and pictures
    /// without data all mean there is nothing to show.
    pub fn from_json(body: &[u8]) -> Result<Option<Self>> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let art: Option<CoverArt> = serde_json::from_slice(body)?;
        Ok(art.filter(|art| !art.data.is_empty()))
    }

    pub fn mime_type(&self) -> String {
        match self.format.trim() {
            "" => "image/jpeg".to_string(),
            format if format.contains('/') => format.to_string(),
            subtype => format!("image/{subtype}"),
        }
    }

    /// Renders the picture as an inline `data:` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.data))
    }
}

/// Visible cover image area.
#[cfg_attr(test, mockall::automock)]
pub trait CoverDisplay: Send + Sync {
    fn show(&self, art: &CoverArt);
}

/// In-memory cover image area. Starts hidden and only ever changes when a
/// session that reaches playback shows its art.
#[derive(Debug, Default)]
pub struct CoverSlot {
    current: Mutex<Option<String>>,
}

impl CoverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `data:` URI currently on display, if any.
    pub fn source(&self) -> Result<Option<String>> {
        Ok(self.lock()?.clone())
    }

    pub fn is_visible(&self) -> bool {
        self.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<String>>> {
        self.current
            .lock()
            .map_err(|_| PulseError::msg("cover slot has been poisoned"))
    }
}

impl CoverDisplay for CoverSlot {
    fn show(&self, art: &CoverArt) {
        match self.lock() {
            Ok(mut slot) => *slot = Some(art.to_data_uri()),
            Err(err) => tracing::warn!(%err, "unable to update cover"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_picture_payload() {
        let art = CoverArt::from_json(br#"{"format":"image/png","data":[1,2,3]}"#)
            .unwrap()
            .unwrap();

        assert_eq!(art.data, vec![1, 2, 3]);
        assert_eq!(art.to_data_uri(), "data:image/png;base64,AQID");
    }

    #[test]
    fn absent_picture_is_not_an_error() {
        assert_eq!(CoverArt::from_json(b"").unwrap(), None);
        assert_eq!(CoverArt::from_json(b"null").unwrap(), None);
        assert_eq!(CoverArt::from_json(b"{}").unwrap(), None);
    }

    #[test]
    fn malformed_picture_is_an_error() {
        assert!(CoverArt::from_json(b"<html>").is_err());
    }

    #[test]
    fn bare_subtype_gets_image_prefix() {
        let art = CoverArt {
            format: "jpeg".to_string(),
            data: vec![0xff],
        };
        assert_eq!(art.mime_type(), "image/jpeg");
    }

    #[test]
    fn slot_shows_latest_art() {
        let slot = CoverSlot::new();
        assert!(!slot.is_visible());

        slot.show(&CoverArt {
            format: "image/png".to_string(),
            data: vec![1, 2, 3],
        });

        assert!(slot.is_visible());
        assert_eq!(
            slot.source().unwrap().as_deref(),
            Some("data:image/png;base64,AQID")
        );
    }
}
