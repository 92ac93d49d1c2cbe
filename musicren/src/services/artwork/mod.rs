//! Artwork resolution
//!
//! Resolves a cover image for a release through an ordered list of
//! providers, sharing results between files of the same release through
//! the batch's [`ArtworkCache`].

mod cache;
mod providers;

pub use cache::{ArtworkCache, FetchMiss};
pub use providers::{CoverArtArchive, DeezerSearch, ITunesSearch};

use crate::models::{ArtworkAsset, CanonicalMetadata, TagSnapshot};
use crate::utils::retry::{with_backoff, Transient};
use async_trait::async_trait;
use musicren_common::config::RetryConfig;
use std::sync::Arc;
use thiserror::Error;

/// Images shorter than this are treated as provider errors
pub const MIN_IMAGE_BYTES: usize = 100;

/// MIME type of `data` when its magic bytes identify an image
fn image_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type())
}

/// Artwork provider errors
#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Transient for ArtworkError {
    fn is_transient(&self) -> bool {
        match self {
            ArtworkError::NetworkError(_) => true,
            ArtworkError::ApiError(status, _) => *status == 429 || *status >= 500,
            ArtworkError::ParseError(_) => false,
        }
    }
}

/// What a provider may search by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkQuery {
    pub release_id: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl ArtworkQuery {
    pub fn from_metadata(metadata: &CanonicalMetadata) -> Self {
        Self {
            release_id: metadata.release_id().map(str::to_string),
            artist: metadata
                .album_artist
                .as_ref()
                .map(|f| f.value.clone())
                .or_else(|| (!metadata.is_incomplete()).then(|| metadata.artist().to_string())),
            album: metadata.album().map(str::to_string),
        }
    }

    pub fn from_tags(tags: &TagSnapshot) -> Self {
        Self {
            release_id: tags.release_id.clone(),
            artist: tags.album_artist.clone().or_else(|| tags.artist.clone()),
            album: tags.album.clone(),
        }
    }

    /// Release id, else lower-cased `artist\u{1f}album`; `None` when neither is known
    pub fn cache_key(&self) -> Option<String> {
        if let Some(id) = self.release_id.as_deref().filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        match (self.artist.as_deref(), self.album.as_deref()) {
            (Some(artist), Some(album)) if !artist.trim().is_empty() && !album.trim().is_empty() => {
                Some(format!(
                    "{}\u{1f}{}",
                    artist.trim().to_lowercase(),
                    album.trim().to_lowercase()
                ))
            }
            _ => None,
        }
    }
}

/// Source of cover images
#[async_trait]
pub trait ArtworkProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Image bytes, `Ok(None)` when the provider has no image for the query
    async fn fetch(&self, query: &ArtworkQuery) -> Result<Option<Vec<u8>>, ArtworkError>;
}

/// Artwork resolver
pub struct ArtworkResolver {
    providers: Vec<Arc<dyn ArtworkProvider>>,
    cache: Arc<ArtworkCache>,
    retry: RetryConfig,
}

impl ArtworkResolver {
    pub fn new(
        providers: Vec<Arc<dyn ArtworkProvider>>,
        cache: Arc<ArtworkCache>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            providers,
            cache,
            retry,
        }
    }

    /// Cover Art Archive, then iTunes, then Deezer
    pub fn default_providers() -> Result<Vec<Arc<dyn ArtworkProvider>>, ArtworkError> {
        let cover_art_archive: Arc<dyn ArtworkProvider> = Arc::new(CoverArtArchive::new()?);
        let itunes: Arc<dyn ArtworkProvider> = Arc::new(ITunesSearch::new()?);
        let deezer: Arc<dyn ArtworkProvider> = Arc::new(DeezerSearch::new()?);
        Ok(vec![cover_art_archive, itunes, deezer])
    }

    pub fn cache(&self) -> &Arc<ArtworkCache> {
        &self.cache
    }

    /// Resolve the cover for a release
    ///
    /// `Ok(None)` when no provider has an image. `Err` only when at least one
    /// provider failed and none produced an image; the failure is not cached.
    pub async fn resolve(
        &self,
        query: &ArtworkQuery,
    ) -> Result<Option<Arc<ArtworkAsset>>, ArtworkError> {
        let Some(key) = query.cache_key() else {
            tracing::debug!("No release identity, artwork lookup skipped");
            return Ok(None);
        };

        match self
            .cache
            .get_or_fetch(&key, || self.fetch_from_providers(&key, query))
            .await
        {
            Ok(asset) => Ok(Some(asset)),
            Err(FetchMiss::NotFound) => Ok(None),
            Err(FetchMiss::Failed(e)) => Err(e),
        }
    }

    async fn fetch_from_providers(
        &self,
        key: &str,
        query: &ArtworkQuery,
    ) -> Result<ArtworkAsset, FetchMiss<ArtworkError>> {
        let mut last_error = None;

        for provider in &self.providers {
            let operation = format!("artwork_{}", provider.name());
            match with_backoff(&operation, &self.retry, || provider.fetch(query)).await {
                Ok(Some(data)) if data.len() < MIN_IMAGE_BYTES => {
                    tracing::warn!(
                        release = %key,
                        provider = provider.name(),
                        bytes = data.len(),
                        "Artwork too small, ignored"
                    );
                }
                Ok(Some(data)) => {
                    let Some(mime) = image_mime(&data) else {
                        tracing::warn!(
                            release = %key,
                            provider = provider.name(),
                            bytes = data.len(),
                            "Artwork is not an image, ignored"
                        );
                        continue;
                    };
                    let mime = mime.to_string();

                    tracing::debug!(
                        release = %key,
                        provider = provider.name(),
                        bytes = data.len(),
                        mime = %mime,
                        "Artwork fetched"
                    );

                    return Ok(ArtworkAsset {
                        release_id: key.to_string(),
                        data,
                        mime,
                        provider: provider.name().to_string(),
                    });
                }
                Ok(None) => {
                    tracing::debug!(release = %key, provider = provider.name(), "No artwork");
                }
                Err(e) => {
                    tracing::warn!(
                        release = %key,
                        provider = provider.name(),
                        error = %e,
                        "Artwork provider unavailable"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => FetchMiss::Failed(e),
            None => FetchMiss::NotFound,
        })
    }
}
