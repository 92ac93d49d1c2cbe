//! Cover art providers
//!
//! - Cover Art Archive: by MusicBrainz release id
//! - iTunes Search and Deezer Search: by artist and album

use super::{ArtworkError, ArtworkProvider, ArtworkQuery};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const COVER_ART_ARCHIVE_URL: &str = "https://coverartarchive.org";
const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";
const DEEZER_SEARCH_URL: &str = "https://api.deezer.com/search/album";

fn build_client() -> Result<reqwest::Client, ArtworkError> {
    reqwest::Client::builder()
        .user_agent(musicren_common::config::get_user_agent())
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| ArtworkError::NetworkError(e.to_string()))
}

/// GET a URL; `Ok(None)` on 404
async fn get_response(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<reqwest::Response>, ArtworkError> {
    tracing::debug!(url = %url, "Requesting artwork resource");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ArtworkError::NetworkError(e.to_string()))?;

    let status = response.status();
    if status == 404 {
        return Ok(None);
    }
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(ArtworkError::ApiError(status.as_u16(), error_text));
    }

    Ok(Some(response))
}

async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Option<Vec<u8>>, ArtworkError> {
    let Some(response) = get_response(client, url).await? else {
        return Ok(None);
    };
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ArtworkError::NetworkError(e.to_string()))?;
    Ok(Some(bytes.to_vec()))
}

/// `artist album` search term, or `None` when either is missing
fn search_term(query: &ArtworkQuery) -> Option<String> {
    let artist = query.artist.as_deref()?.trim();
    let album = query.album.as_deref()?.trim();
    if artist.is_empty() || album.is_empty() {
        return None;
    }
    Some(format!("{} {}", artist, album))
}

/// Cover Art Archive front image
pub struct CoverArtArchive {
    http_client: reqwest::Client,
    base_url: String,
}

impl CoverArtArchive {
    pub fn new() -> Result<Self, ArtworkError> {
        Self::with_base_url(COVER_ART_ARCHIVE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, ArtworkError> {
        Ok(Self {
            http_client: build_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl ArtworkProvider for CoverArtArchive {
    fn name(&self) -> &'static str {
        "coverartarchive"
    }

    async fn fetch(&self, query: &ArtworkQuery) -> Result<Option<Vec<u8>>, ArtworkError> {
        let Some(release_id) = query.release_id.as_deref() else {
            return Ok(None);
        };
        let url = format!("{}/release/{}/front", self.base_url, release_id);
        get_bytes(&self.http_client, &url).await
    }
}

#[derive(Debug, Deserialize)]
struct ITunesResponse {
    #[serde(default)]
    results: Vec<ITunesAlbum>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ITunesAlbum {
    artwork_url100: Option<String>,
}

/// iTunes Search album artwork (600x600)
pub struct ITunesSearch {
    http_client: reqwest::Client,
    base_url: String,
}

impl ITunesSearch {
    pub fn new() -> Result<Self, ArtworkError> {
        Self::with_base_url(ITUNES_SEARCH_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, ArtworkError> {
        Ok(Self {
            http_client: build_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl ArtworkProvider for ITunesSearch {
    fn name(&self) -> &'static str {
        "itunes"
    }

    async fn fetch(&self, query: &ArtworkQuery) -> Result<Option<Vec<u8>>, ArtworkError> {
        let Some(term) = search_term(query) else {
            return Ok(None);
        };
        let url = format!(
            "{}?term={}&entity=album&limit=1",
            self.base_url,
            urlencoding::encode(&term)
        );

        let Some(response) = get_response(&self.http_client, &url).await? else {
            return Ok(None);
        };
        let search: ITunesResponse = response
            .json()
            .await
            .map_err(|e| ArtworkError::ParseError(e.to_string()))?;

        let Some(cover_url) = search
            .results
            .into_iter()
            .find_map(|album| album.artwork_url100)
            .map(|url| url.replace("100x100", "600x600"))
        else {
            return Ok(None);
        };

        get_bytes(&self.http_client, &cover_url).await
    }
}

#[derive(Debug, Deserialize)]
struct DeezerResponse {
    #[serde(default)]
    data: Vec<DeezerAlbum>,
}

#[derive(Debug, Deserialize)]
struct DeezerAlbum {
    cover_xl: Option<String>,
    cover_big: Option<String>,
    cover: Option<String>,
}

impl DeezerAlbum {
    /// Largest available cover
    fn best_cover(self) -> Option<String> {
        self.cover_xl.or(self.cover_big).or(self.cover)
    }
}

/// Deezer album search artwork
pub struct DeezerSearch {
    http_client: reqwest::Client,
    base_url: String,
}

impl DeezerSearch {
    pub fn new() -> Result<Self, ArtworkError> {
        Self::with_base_url(DEEZER_SEARCH_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, ArtworkError> {
        Ok(Self {
            http_client: build_client()?,
            base_url,
        })
    }
}

#[async_trait]
impl ArtworkProvider for DeezerSearch {
    fn name(&self) -> &'static str {
        "deezer"
    }

    async fn fetch(&self, query: &ArtworkQuery) -> Result<Option<Vec<u8>>, ArtworkError> {
        let Some(term) = search_term(query) else {
            return Ok(None);
        };
        let url = format!("{}?q={}&limit=1", self.base_url, urlencoding::encode(&term));

        let Some(response) = get_response(&self.http_client, &url).await? else {
            return Ok(None);
        };
        let search: DeezerResponse = response
            .json()
            .await
            .map_err(|e| ArtworkError::ParseError(e.to_string()))?;

        let Some(cover_url) = search.data.into_iter().find_map(DeezerAlbum::best_cover) else {
            return Ok(None);
        };

        get_bytes(&self.http_client, &cover_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_term_requires_artist_and_album() {
        let full = ArtworkQuery {
            release_id: None,
            artist: Some("Daft Punk".to_string()),
            album: Some("Discovery".to_string()),
        };
        assert_eq!(search_term(&full).as_deref(), Some("Daft Punk Discovery"));

        let no_album = ArtworkQuery {
            album: Some("  ".to_string()),
            ..full.clone()
        };
        assert_eq!(search_term(&no_album), None);
    }

    #[test]
    fn test_itunes_response_parsing() {
        let parsed: ITunesResponse = serde_json::from_str(
            r#"{"resultCount": 1, "results": [{"artworkUrl100": "https://is1.example/100x100bb.jpg"}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.results[0].artwork_url100.as_deref(),
            Some("https://is1.example/100x100bb.jpg")
        );
    }

    #[test]
    fn test_deezer_prefers_largest_cover() {
        let parsed: DeezerResponse = serde_json::from_str(
            r#"{"total": 1, "data": [{"cover": "s.jpg", "cover_big": "b.jpg", "cover_xl": null}]}"#,
        )
        .unwrap();
        let cover = parsed.data.into_iter().find_map(DeezerAlbum::best_cover);
        assert_eq!(cover.as_deref(), Some("b.jpg"));
    }

    #[tokio::test]
    async fn test_cover_art_archive_skips_without_release_id() {
        let provider = CoverArtArchive::new().unwrap();
        let query = ArtworkQuery {
            release_id: None,
            artist: Some("Queen".to_string()),
            album: Some("Jazz".to_string()),
        };
        assert_eq!(provider.fetch(&query).await.unwrap(), None);
    }
}
