use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{CoverArt, PulseError, Result};

/// Length of the `.mp3` suffix stripped from media file names.
const EXTENSION_LEN: usize = 4;

/// Derives a track id from a media file name by dropping its extension.
pub fn track_id_from_file_name(name: &str) -> Option<&str> {
    let cut = name.len().checked_sub(EXTENSION_LEN)?;
    if cut == 0 || !name.is_char_boundary(cut) {
        return None;
    }
    Some(&name[..cut])
}

/// Source of track payloads and their cover art.
#[async_trait]
pub trait TrackFetcher: Send + Sync {
    async fn fetch_audio(&self, track: &str) -> Result<Bytes>;

    /// `Ok(None)` when the track carries no picture.
    async fn fetch_picture(&self, track: &str) -> Result<Option<CoverArt>>;
}

/// Fetches from the media server: `GET /media/{track}.mp3` and
/// `GET /picture?songName={track}`.
#[derive(Debug, Clone)]
pub struct HttpTrackFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrackFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn media_url(&self, track: &str) -> String {
        format!("{}/media/{}.mp3", self.base_url, track)
    }

    pub fn picture_url(&self) -> String {
        format!("{}/picture", self.base_url)
    }
}

#[async_trait]
impl TrackFetcher for HttpTrackFetcher {
    async fn fetch_audio(&self, track: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(self.media_url(track))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| PulseError::fetch(track, err))?;

        response
            .bytes()
            .await
            .map_err(|err| PulseError::fetch(track, err))
    }

    async fn fetch_picture(&self, track: &str) -> Result<Option<CoverArt>> {
        let response = self
            .client
            .get(self.picture_url())
            .query(&[("songName", track)])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| PulseError::fetch(track, err))?;

        let body = response
            .bytes()
            .await
            .map_err(|err| PulseError::fetch(track, err))?;
        CoverArt::from_json(&body)
    }
}

/// Reads `{media_dir}/{track}.mp3` from disk. Local files carry no cover art.
#[derive(Debug, Clone)]
pub struct FileTrackFetcher {
    media_dir: PathBuf,
}

impl FileTrackFetcher {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub fn track_path(&self, track: &str) -> PathBuf {
        self.media_dir.join(format!("{track}.mp3"))
    }

    /// Lists selectable track ids, sorted by name.
    pub async fn list_tracks(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.media_dir).await?;
        let mut tracks = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(track) = name.to_str().and_then(track_id_from_file_name) {
                tracks.push(track.to_string());
            }
        }

        tracks.sort();
        Ok(tracks)
    }
}

#[async_trait]
impl TrackFetcher for FileTrackFetcher {
    async fn fetch_audio(&self, track: &str) -> Result<Bytes> {
        tokio::fs::read(self.track_path(track))
            .await
            .map(Bytes::from)
            .map_err(|err| PulseError::fetch(track, err))
    }

    async fn fetch_picture(&self, _track: &str) -> Result<Option<CoverArt>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fixed_extension() {
        assert_eq!(track_id_from_file_name("song.mp3"), Some("song"));
        assert_eq!(track_id_from_file_name("a b.mp3"), Some("a b"));
        assert_eq!(track_id_from_file_name(".mp3"), None);
        assert_eq!(track_id_from_file_name("mp3"), None);
    }

    #[test]
    fn builds_collaborator_urls() {
        let fetcher = HttpTrackFetcher::new("http://localhost:3000/");
        assert_eq!(fetcher.media_url("intro"), "http://localhost:3000/media/intro.mp3");
        assert_eq!(fetcher.picture_url(), "http://localhost:3000/picture");
    }

    #[tokio::test]
    async fn file_fetcher_reads_and_lists_tracks() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("beta.mp3"), b"bbb").await.unwrap();
        tokio::fs::write(dir.path().join("alpha.mp3"), b"aaa").await.unwrap();

        let fetcher = FileTrackFetcher::new(dir.path());
        let tracks = fetcher.list_tracks().await.unwrap();
        let bytes = fetcher.fetch_audio("alpha").await.unwrap();
        let picture = fetcher.fetch_picture("alpha").await.unwrap();
        let missing = fetcher.fetch_audio("gamma").await;

        assert_eq!(tracks, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(&bytes[..], b"aaa");
        assert!(picture.is_none());
        assert!(matches!(missing, Err(PulseError::Fetch { .. })));
    }
}
