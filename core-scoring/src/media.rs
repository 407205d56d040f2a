// =====================================================================================
// File: core-scoring/src/media.rs
// Description: Resolution of evidence payloads to bytes from base64, disk, or URL
// =====================================================================================

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{ScoringError, ScoringResult};
use crate::types::{EvidenceDocument, EvidenceImage, EvidenceVideo};

/// Anything carrying one of the three payload sources
pub trait MediaSource {
    fn media_id(&self) -> &str;
    fn url(&self) -> Option<&str>;
    fn file_path(&self) -> Option<&str>;
    fn base64_data(&self) -> Option<&str>;
}

macro_rules! impl_media_source {
    ($ty:ty) => {
        impl MediaSource for $ty {
            fn media_id(&self) -> &str {
                &self.id
            }
            fn url(&self) -> Option<&str> {
                self.url.as_deref()
            }
            fn file_path(&self) -> Option<&str> {
                self.file_path.as_deref()
            }
            fn base64_data(&self) -> Option<&str> {
                self.base64_data.as_deref()
            }
        }
    };
}

impl_media_source!(EvidenceImage);
impl_media_source!(EvidenceDocument);
impl_media_source!(EvidenceVideo);

/// Fetches media bytes from inline base64, local disk, or a URL.
/// Payload sources are tried in that order.
pub struct MediaLoader {
    timeout_secs: u64,
}

impl MediaLoader {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub fn load_bytes<S: MediaSource>(&self, source: &S) -> ScoringResult<Vec<u8>> {
        if let Some(encoded) = source.base64_data() {
            return self.load_from_base64(source.media_id(), encoded);
        }
        if let Some(path) = source.file_path() {
            return self.load_from_file(source.media_id(), path);
        }
        if let Some(url) = source.url() {
            return self.load_from_url(source.media_id(), url);
        }
        Err(ScoringError::load_error(
            source.media_id(),
            "no media payload available",
        ))
    }

    fn load_from_base64(&self, media_id: &str, encoded: &str) -> ScoringResult<Vec<u8>> {
        BASE64.decode(encoded).map_err(|err| {
            ScoringError::load_error(media_id, &format!("invalid base64 payload: {err}"))
        })
    }

    fn load_from_file(&self, media_id: &str, file_path: &str) -> ScoringResult<Vec<u8>> {
        let path = Path::new(file_path);
        if !path.exists() {
            return Err(ScoringError::load_error(
                media_id,
                &format!("file not found: {file_path}"),
            ));
        }
        std::fs::read(path)
            .map_err(|err| ScoringError::load_error(media_id, &format!("read failed: {err}")))
    }

    // The blocking client lives only for the duration of one fetch; scoring
    // runs on a blocking worker, never on an async executor thread
    fn load_from_url(&self, media_id: &str, url: &str) -> ScoringResult<Vec<u8>> {
        debug!(media_id, url, "Fetching media payload");
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|err| ScoringError::load_error(media_id, &format!("client init failed: {err}")))?;
        let response = client
            .get(url)
            .send()
            .map_err(|err| ScoringError::load_error(media_id, &format!("download failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ScoringError::load_error(
                media_id,
                &format!("failed to download media: {url}"),
            ));
        }
        let bytes = response
            .bytes()
            .map_err(|err| ScoringError::load_error(media_id, &format!("read failed: {err}")))?;
        Ok(bytes.to_vec())
    }
}

impl Default for MediaLoader {
    fn default() -> Self {
        Self::new(10)
    }
}
