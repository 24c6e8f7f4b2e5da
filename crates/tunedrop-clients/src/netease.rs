use chrono::{DateTime, Datelike};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use tunedrop_ingest::{
    CatalogClient, CoverArt, TrackMetadata,
    config::CatalogConfig,
    metadata::{CoverRef, parse_cover_ref},
};

use crate::error::ClientError;

/// `originCoverType` de una versión cover
const COVER_VERSION: i64 = 2;

// Structs para parsear las respuestas de la API
#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    songs: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    songs: Vec<Song>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Song {
    id: u64,
    name: Option<String>,
    #[serde(default)]
    ar: Vec<Artist>,
    al: Option<Album>,
    publish_time: Option<i64>,
    /// Llega como texto ("01") o como número según la versión de la API
    cd: Option<Value>,
    no: Option<Value>,
    #[serde(default)]
    origin_cover_type: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct Artist {
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Album {
    name: Option<String>,
    pic_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LyricResponse {
    lrc: Option<Lyric>,
}

#[derive(Debug, Deserialize)]
struct Lyric {
    lyric: Option<String>,
}

/// Cliente para una instancia de NeteaseCloudMusicApi.
#[derive(Debug, Clone)]
pub struct NeteaseClient {
    base_url: String,
    search_limit: usize,
    skip_cover_versions: bool,
    client: reqwest::Client,
}

impl NeteaseClient {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            search_limit: config.search_limit.max(1),
            skip_cover_versions: config.skip_cover_versions,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// Ids de los primeros `search_limit` resultados.
    pub async fn search_ids(&self, keyword: &str) -> Result<Vec<u64>, ClientError> {
        let response = self
            .client
            .get(self.url("/search"))
            .query(&[("keywords", keyword), ("type", "1")])
            .send()
            .await?
            .error_for_status()?
            .json::<SearchResponse>()
            .await?;

        let ids: Vec<u64> = response
            .result
            .map(|r| r.songs)
            .unwrap_or_default()
            .into_iter()
            .take(self.search_limit)
            .map(|s| s.id)
            .collect();

        if ids.is_empty() {
            return Err(ClientError::NoResults(keyword.to_string()));
        }
        Ok(ids)
    }

    async fn song_detail(&self, ids: &[u64]) -> Result<Song, ClientError> {
        let joined = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
        let response = self
            .client
            .get(self.url("/song/detail"))
            .query(&[("ids", joined.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json::<DetailResponse>()
            .await?;

        pick_song(response.songs, self.skip_cover_versions).ok_or_else(|| ClientError::NoMatch(ids.to_vec()))
    }

    async fn lyrics(&self, id: u64) -> Result<Option<String>, ClientError> {
        let response = self
            .client
            .get(self.url("/lyric"))
            .query(&[("id", id.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json::<LyricResponse>()
            .await?;

        Ok(response
            .lrc
            .and_then(|l| l.lyric)
            .filter(|l| !l.trim().is_empty()))
    }

    /// URL remota, data URL o base64.
    pub async fn fetch_cover(&self, reference: &str) -> Result<CoverArt, ClientError> {
        let data = match parse_cover_ref(reference)? {
            CoverRef::Remote(url) => self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec(),
            CoverRef::Inline(bytes) => bytes,
        };
        Ok(CoverArt::from_bytes(data))
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn lookup(&self, keyword: &str) -> Result<TrackMetadata, ClientError> {
        // 1) Búsqueda
        let ids = self.search_ids(keyword).await?;

        // 2) Detalle y elección
        let song = self.song_detail(&ids).await?;
        debug!(id = song.id, name = ?song.name, "canción elegida");

        // 3) Letra (opcional)
        let lyrics = match self.lyrics(song.id).await {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, id = song.id, "no se pudo obtener la letra, sigo");
                None
            }
        };

        // 4) Portada (opcional)
        let cover = match song.al.as_ref().and_then(|al| al.pic_url.as_deref()) {
            Some(reference) => match self.fetch_cover(reference).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, id = song.id, "no se pudo obtener la portada, sigo");
                    None
                }
            },
            None => None,
        };

        Ok(song_to_metadata(song, lyrics, cover))
    }
}

#[async_trait::async_trait]
impl CatalogClient for NeteaseClient {
    async fn search(&self, keyword: &str) -> anyhow::Result<TrackMetadata> {
        Ok(self.lookup(keyword).await?)
    }
}

fn pick_song(songs: Vec<Song>, skip_cover_versions: bool) -> Option<Song> {
    if skip_cover_versions {
        songs.into_iter().find(|s| s.origin_cover_type != COVER_VERSION)
    } else {
        songs.into_iter().next()
    }
}

fn number_like(value: Option<&Value>) -> Option<u32> {
    let n: Option<u32> = match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| *n > 0)
}

fn year_of(publish_time_ms: Option<i64>) -> Option<u32> {
    let ms = publish_time_ms.filter(|ms| *ms > 0)?;
    DateTime::from_timestamp_millis(ms).and_then(|d| u32::try_from(d.year()).ok())
}

fn song_to_metadata(song: Song, lyrics: Option<String>, cover: Option<CoverArt>) -> TrackMetadata {
    let artists: Vec<String> = song.ar.iter().filter_map(|a| a.name.clone()).collect();

    TrackMetadata {
        title: song.name,
        album_artists: artists.clone(),
        artists,
        album: song.al.and_then(|al| al.name),
        year: year_of(song.publish_time),
        disc_number: number_like(song.cd.as_ref()),
        track_number: number_like(song.no.as_ref()),
        genres: Vec::new(),
        comment: None,
        lyrics,
        cover,
    }
}
