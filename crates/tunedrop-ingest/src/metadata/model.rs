use derive_builder::Builder;

use crate::metadata::covers::sniff_mime;

/// Imagen de portada embebida (bytes crudos + MIME)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl CoverArt {
    /// Construye la portada detectando el MIME por los magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&data).to_string();
        CoverArt { data, mime_type }
    }
}

/// Etiquetas de una pista. Todos los campos son opcionales: un valor vacío,
/// una lista vacía o un número cero cuentan como "ausente".
#[derive(Debug, Clone, PartialEq, Eq, Default, Builder)]
#[builder(default, setter(into, strip_option))]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album_artists: Vec<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub genres: Vec<String>,
    pub comment: Option<String>,
    pub lyrics: Option<String>,
    pub cover: Option<CoverArt>,
}

impl TrackMetadata {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    pub fn first_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str).filter(|a| !a.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        *self == TrackMetadata::default()
    }
}
