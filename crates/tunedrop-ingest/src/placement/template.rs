use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{error::PlacementError, metadata::TrackMetadata};

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// Caracteres prohibidos en el nombre de fichero final
const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Title,
    Performers,
    AlbumArtists,
    Album,
    Year,
    Disc,
    Track,
    Genres,
    Comment,
    Extension,
    /// Campo desconocido: se renderiza vacío
    Unknown(String),
}

impl Field {
    fn from_name(name: &str) -> Self {
        match name {
            "title" => Field::Title,
            "performers" | "artists" | "artist" => Field::Performers,
            "albumArtists" | "album_artists" | "albumArtist" => Field::AlbumArtists,
            "album" => Field::Album,
            "year" => Field::Year,
            "disc" | "disk" => Field::Disc,
            "track" => Field::Track,
            "genres" | "genre" => Field::Genres,
            "comment" => Field::Comment,
            "extension" => Field::Extension,
            other => Field::Unknown(other.to_string()),
        }
    }

    fn render(&self, tag: &TrackMetadata, extension: &str) -> String {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        fn first(v: &[String]) -> String {
            v.first().cloned().unwrap_or_default()
        }
        fn number(v: Option<u32>) -> String {
            v.filter(|n| *n > 0).map(|n| n.to_string()).unwrap_or_default()
        }

        match self {
            Field::Title => text(&tag.title),
            Field::Performers => first(&tag.artists),
            Field::AlbumArtists => first(&tag.album_artists),
            Field::Album => text(&tag.album),
            Field::Year => number(tag.year),
            Field::Disc => number(tag.disc_number),
            Field::Track => number(tag.track_number),
            Field::Genres => first(&tag.genres),
            Field::Comment => text(&tag.comment),
            Field::Extension => format!(".{extension}"),
            Field::Unknown(_) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field(Field),
}

/// Plantilla de nombres ya parseada: segmentos separados por `/`, cada uno
/// una secuencia de texto literal y placeholders `{campo}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementTemplate {
    segments: Vec<Vec<Piece>>,
    has_extension: bool,
}

impl PlacementTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        if template.trim().is_empty() {
            return Err("naming template is empty".into());
        }

        let leftover = PLACEHOLDER_REGEX.replace_all(template, "");
        if leftover.contains('{') || leftover.contains('}') {
            return Err(format!("unbalanced braces in naming template: {template}"));
        }

        let segments: Vec<Vec<Piece>> = template.split('/').map(parse_segment).collect();
        let has_extension = segments
            .iter()
            .flatten()
            .any(|p| *p == Piece::Field(Field::Extension));

        Ok(PlacementTemplate { segments, has_extension })
    }

    /// Ruta relativa al directorio destino para `tag`.
    ///
    /// Los segmentos vacíos desaparecen, los valores con `/` en un directorio
    /// generan niveles extra y sólo el nombre de fichero se sanea.
    pub fn render(&self, tag: &TrackMetadata, extension: &str) -> Result<PathBuf, PlacementError> {
        let mut rendered: Vec<String> = self
            .segments
            .iter()
            .map(|pieces| {
                pieces
                    .iter()
                    .map(|p| match p {
                        Piece::Literal(s) => s.clone(),
                        Piece::Field(f) => f.render(tag, extension),
                    })
                    .collect::<String>()
            })
            .collect();

        let mut file_name = rendered.pop().unwrap_or_default();
        if !self.has_extension {
            file_name.push('.');
            file_name.push_str(extension);
        }

        let file_name = sanitize_file_name(&file_name);
        if file_name.is_empty() {
            return Err(PlacementError::EmptyName(rendered.join("/")));
        }
        if file_name == "." || file_name == ".." {
            return Err(PlacementError::Escape(file_name));
        }

        let mut relative = PathBuf::new();
        for segment in &rendered {
            for level in segment.split('/').filter(|l| !l.is_empty()) {
                push_normal(&mut relative, level)?;
            }
        }
        relative.push(file_name);

        Ok(relative)
    }
}

fn parse_segment(segment: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER_REGEX.captures_iter(segment) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            pieces.push(Piece::Literal(segment[last..whole.start()].to_string()));
        }
        pieces.push(Piece::Field(Field::from_name(name.as_str())));
        last = whole.end();
    }
    if last < segment.len() {
        pieces.push(Piece::Literal(segment[last..].to_string()));
    }

    pieces
}

/// Añade `level` sólo si es un componente normal; `.` se ignora.
fn push_normal(path: &mut PathBuf, level: &str) -> Result<(), PlacementError> {
    for component in Path::new(level).components() {
        match component {
            Component::Normal(c) => path.push(c),
            Component::CurDir => {}
            _ => return Err(PlacementError::Escape(level.to_string())),
        }
    }
    Ok(())
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}
