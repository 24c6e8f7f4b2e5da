use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoverError {
    #[error("referencia de portada vacía")]
    Empty,

    #[error("data URL sin payload")]
    MalformedDataUrl,

    #[error("base64 inválido: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Una portada tal y como llega del catálogo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverRef {
    /// Hay que descargarla
    Remote(String),
    /// Ya viene embebida (data URL o base64 pelado)
    Inline(Vec<u8>),
}

/// `http(s)://…` → remota, `data:…;base64,…` o base64 pelado → bytes.
pub fn parse_cover_ref(reference: &str) -> Result<CoverRef, CoverError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(CoverError::Empty);
    }

    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(CoverRef::Remote(reference.to_string()));
    }

    let payload = if reference.starts_with("data:") {
        reference
            .split_once(',')
            .map(|(_, data)| data)
            .filter(|data| !data.is_empty())
            .ok_or(CoverError::MalformedDataUrl)?
    } else {
        reference
    };

    Ok(CoverRef::Inline(STANDARD.decode(payload)?))
}

/// MIME a partir de la firma del fichero.
pub fn sniff_mime(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xDB, 0]), "image/jpeg");
        assert_eq!(sniff_mime(&[0x89, 0x50, 0x4E, 0x47]), "image/png");
        assert_eq!(sniff_mime(b"GIF89a"), "image/gif");
        assert_eq!(sniff_mime(b"RIFF"), "application/octet-stream");
        assert_eq!(sniff_mime(&[]), "application/octet-stream");
    }

    #[test]
    fn parses_every_reference_shape() {
        assert_eq!(
            parse_cover_ref("https://p1.music.126.net/a.jpg").unwrap(),
            CoverRef::Remote("https://p1.music.126.net/a.jpg".into())
        );
        assert_eq!(
            parse_cover_ref("data:image/png;base64,AQID").unwrap(),
            CoverRef::Inline(vec![1, 2, 3])
        );
        assert_eq!(parse_cover_ref("AQID").unwrap(), CoverRef::Inline(vec![1, 2, 3]));
        assert!(matches!(parse_cover_ref("data:image/png;base64,"), Err(CoverError::MalformedDataUrl)));
        assert!(matches!(parse_cover_ref("  "), Err(CoverError::Empty)));
        assert!(matches!(parse_cover_ref("not base64!"), Err(CoverError::Base64(_))));
    }
}
