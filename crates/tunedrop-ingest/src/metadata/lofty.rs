use std::{borrow::Cow, path::Path};

use lofty::{
    config::WriteOptions,
    picture::{MimeType, Picture, PictureType},
    prelude::*,
    probe::Probe,
    tag::{ItemValue, Tag, TagItem, TagType},
};
use tracing::{instrument, trace};

use crate::{
    error::CodecError,
    metadata::{
        codec::TagCodec,
        covers::sniff_mime,
        model::{CoverArt, TrackMetadata},
    },
};

/// Separador multi-valor de ID3v2.4
const ID3V2_SEPARATOR: &str = "\0";

/// Claves con varios valores que gestionamos
const LIST_KEYS: [ItemKey; 3] = [ItemKey::TrackArtist, ItemKey::AlbumArtist, ItemKey::Genre];

/// Codec genérico sobre `lofty`: lee la etiqueta primaria (o la primera que
/// haya) y escribe sobre la primaria, creándola si falta.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyCodec;

impl TagCodec for LoftyCodec {
    #[instrument(level = "trace", skip(self), err)]
    fn read(&self, path: &Path) -> Result<TrackMetadata, CodecError> {
        let tagged = Probe::open(path)?.read()?;

        let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
            trace!(path = %path.display(), "archivo sin etiquetas");
            return Ok(TrackMetadata::default());
        };

        Ok(tag_to_metadata(tag))
    }

    #[instrument(level = "trace", skip(self, meta), err)]
    fn write(&self, path: &Path, meta: &TrackMetadata) -> Result<(), CodecError> {
        let mut tagged = Probe::open(path)?.read()?;
        let tag_type = tagged.primary_tag_type();

        if tagged.tag(tag_type).is_none() {
            tagged.insert_tag(Tag::new(tag_type));
        }
        let Some(native) = tagged.tag_mut(tag_type) else {
            return Err(CodecError::TagUnsupported(format!("{tag_type:?}")));
        };

        apply_metadata(native, meta);
        tagged.save_to_path(path, WriteOptions::default())?;
        Ok(())
    }
}

fn strings(tag: &Tag, key: &ItemKey) -> Vec<String> {
    tag.get_strings(key)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn tag_to_metadata(tag: &Tag) -> TrackMetadata {
    let cover = tag
        .pictures()
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| tag.pictures().first())
        .map(|p| CoverArt {
            data: p.data().to_vec(),
            mime_type: p
                .mime_type()
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| sniff_mime(p.data()).to_string()),
        });

    TrackMetadata {
        title: tag.title().map(Cow::into_owned),
        artists: strings(tag, &ItemKey::TrackArtist),
        album_artists: strings(tag, &ItemKey::AlbumArtist),
        album: tag.album().map(Cow::into_owned),
        year: tag.year(),
        disc_number: tag.disk(),
        track_number: tag.track(),
        genres: strings(tag, &ItemKey::Genre),
        comment: tag.comment().map(Cow::into_owned),
        lyrics: tag.get_string(&ItemKey::Lyrics).map(str::to_string),
        cover,
    }
}

fn set_text(tag: &mut Tag, key: ItemKey, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        tag.insert_text(key, v.to_string());
    }
}

fn set_list(tag: &mut Tag, key: ItemKey, values: &[String]) {
    if values.is_empty() {
        return;
    }
    tag.remove_key(&key);
    for v in values.iter().filter(|v| !v.is_empty()) {
        tag.push(TagItem::new(key.clone(), ItemValue::Text(v.clone())));
    }
}

/// ID3v2 escribe un frame por item y el último pisa a los anteriores: los
/// valores repetidos se unen en uno solo. Al leer, lofty los vuelve a separar.
fn join_id3v2_values(tag: &mut Tag, key: &ItemKey) {
    let values: Vec<String> = tag
        .get_strings(key)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if values.len() > 1 {
        tag.insert_text(key.clone(), values.join(ID3V2_SEPARATOR));
    }
}

/// Vuelca `meta` sobre la etiqueta nativa. Lo ausente no se toca.
fn apply_metadata(tag: &mut Tag, meta: &TrackMetadata) {
    set_text(tag, ItemKey::TrackTitle, meta.title.as_deref());
    set_text(tag, ItemKey::AlbumTitle, meta.album.as_deref());
    set_text(tag, ItemKey::Comment, meta.comment.as_deref());
    set_text(tag, ItemKey::Lyrics, meta.lyrics.as_deref());

    set_list(tag, ItemKey::TrackArtist, &meta.artists);
    set_list(tag, ItemKey::AlbumArtist, &meta.album_artists);
    set_list(tag, ItemKey::Genre, &meta.genres);

    if let Some(year) = meta.year.filter(|y| *y > 0) {
        tag.set_year(year);
    }
    if let Some(track) = meta.track_number.filter(|n| *n > 0) {
        tag.set_track(track);
    }
    if let Some(disc) = meta.disc_number.filter(|n| *n > 0) {
        tag.set_disk(disc);
    }

    if let Some(cover) = &meta.cover {
        while !tag.pictures().is_empty() {
            tag.remove_picture(0);
        }
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::from_str(&cover.mime_type)),
            None,
            cover.data.clone(),
        ));
    }

    // También lo que ya traía el archivo y no hemos tocado
    if tag.tag_type() == TagType::Id3v2 {
        for key in &LIST_KEYS {
            join_id3v2_values(tag, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::model::TrackMetadataBuilder;
    use tempfile::tempdir;

    fn silent_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn untagged_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        silent_wav(&path);

        let meta = LoftyCodec.read(&path).unwrap();
        assert_eq!(meta.title(), None);
        assert_eq!(meta.first_artist(), None);
    }

    #[test]
    fn written_fields_are_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        silent_wav(&path);

        let meta = TrackMetadataBuilder::default()
            .title("Song")
            .artists(vec!["Artist".to_string()])
            .build()
            .unwrap();
        LoftyCodec.write(&path, &meta).unwrap();

        let back = LoftyCodec.read(&path).unwrap();
        assert_eq!(back.title(), Some("Song"));
        assert_eq!(back.first_artist(), Some("Artist"));
    }

    /// `fLaC` + STREAMINFO (8 kHz, mono, 16 bits, 800 muestras), sin tramas.
    fn bare_flac(path: &Path) {
        let mut bytes = b"fLaC".to_vec();
        bytes.push(0x80); // último bloque, tipo STREAMINFO
        bytes.extend_from_slice(&[0, 0, 34]);
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 6]);
        let packed: u64 = (8000u64 << 44) | (15u64 << 36) | 800;
        bytes.extend_from_slice(&packed.to_be_bytes());
        bytes.extend_from_slice(&[0; 16]);
        std::fs::write(path, bytes).unwrap();
    }

    fn multi_valued() -> TrackMetadata {
        TrackMetadataBuilder::default()
            .title("Song")
            .artists(vec!["A".to_string(), "B".to_string()])
            .album_artists(vec!["A".to_string(), "B".to_string()])
            .genres(vec!["Rock".to_string(), "Pop".to_string()])
            .year(2020u32)
            .track_number(3u32)
            .disc_number(1u32)
            .build()
            .unwrap()
    }

    fn assert_multi_valued(back: &TrackMetadata) {
        assert_eq!(back.artists, vec!["A", "B"]);
        assert_eq!(back.album_artists, vec!["A", "B"]);
        assert_eq!(back.genres, vec!["Rock", "Pop"]);
        assert_eq!(back.year, Some(2020));
        assert_eq!(back.track_number, Some(3));
        assert_eq!(back.disc_number, Some(1));
    }

    #[test]
    fn id3v2_keeps_every_artist_and_genre() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        silent_wav(&path);

        LoftyCodec.write(&path, &multi_valued()).unwrap();
        assert_multi_valued(&LoftyCodec.read(&path).unwrap());
    }

    #[test]
    fn vorbis_comments_keep_every_artist_and_genre() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bare.flac");
        bare_flac(&path);

        LoftyCodec.write(&path, &multi_valued()).unwrap();
        assert_multi_valued(&LoftyCodec.read(&path).unwrap());
    }

    #[test]
    fn untouched_multi_values_survive_a_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        silent_wav(&path);
        LoftyCodec.write(&path, &multi_valued()).unwrap();

        // Sólo cambia el álbum; artistas y géneros vienen del propio archivo
        let album_only = TrackMetadataBuilder::default().album("Album").build().unwrap();
        LoftyCodec.write(&path, &album_only).unwrap();

        let back = LoftyCodec.read(&path).unwrap();
        assert_eq!(back.album.as_deref(), Some("Album"));
        assert_multi_valued(&back);
        assert_eq!(back.first_artist(), Some("A"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(LoftyCodec.read(&dir.path().join("nope.mp3")).is_err());
    }
}
