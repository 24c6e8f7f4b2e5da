//! Fusión "rellenar solo lo que falta": lo que el usuario ya tiene en el
//! archivo nunca se pisa. La portada es la excepción, siempre se refresca.

use crate::metadata::model::TrackMetadata;

fn pick_text(existing: &Option<String>, candidate: &Option<String>) -> Option<String> {
    match existing {
        Some(v) if !v.is_empty() => Some(v.clone()),
        _ => candidate.clone(),
    }
}

fn pick_number(existing: Option<u32>, candidate: Option<u32>) -> Option<u32> {
    match existing {
        Some(n) if n != 0 => Some(n),
        _ => candidate,
    }
}

fn pick_list(existing: &[String], candidate: &[String]) -> Vec<String> {
    if existing.is_empty() {
        candidate.to_vec()
    } else {
        existing.to_vec()
    }
}

pub fn merge(existing: &TrackMetadata, candidate: &TrackMetadata) -> TrackMetadata {
    TrackMetadata {
        title: pick_text(&existing.title, &candidate.title),
        artists: pick_list(&existing.artists, &candidate.artists),
        album_artists: pick_list(&existing.album_artists, &candidate.album_artists),
        album: pick_text(&existing.album, &candidate.album),
        year: pick_number(existing.year, candidate.year),
        disc_number: pick_number(existing.disc_number, candidate.disc_number),
        track_number: pick_number(existing.track_number, candidate.track_number),
        genres: pick_list(&existing.genres, &candidate.genres),
        comment: pick_text(&existing.comment, &candidate.comment),
        lyrics: pick_text(&existing.lyrics, &candidate.lyrics),
        cover: candidate.cover.clone().or_else(|| existing.cover.clone()),
    }
}
