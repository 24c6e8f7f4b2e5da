use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contenedores de audio que el watcher reconoce
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SupportedExtension {
    Mp3,
    M4a,
    Flac,
    Wav,
    Aac,
}

impl SupportedExtension {
    pub const ALL: &'static [SupportedExtension] = &[
        SupportedExtension::Mp3,
        SupportedExtension::M4a,
        SupportedExtension::Flac,
        SupportedExtension::Wav,
        SupportedExtension::Aac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedExtension::Mp3 => "mp3",
            SupportedExtension::M4a => "m4a",
            SupportedExtension::Flac => "flac",
            SupportedExtension::Wav => "wav",
            SupportedExtension::Aac => "aac",
        }
    }

    /// Extensión de `path` tal y como la da el SO. La comparación es
    /// sensible a mayúsculas: `SONG.MP3` no se reconoce.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        SupportedExtension::ALL.iter().find(|e| e.as_str() == ext).copied()
    }
}

impl std::str::FromStr for SupportedExtension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_start_matches('.');
        SupportedExtension::ALL
            .iter()
            .find(|ext| ext.as_str() == trimmed)
            .cloned()
            .ok_or_else(|| format!("Extension not supported: {}", s))
    }
}

impl std::fmt::Display for SupportedExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lista permitida por defecto
pub fn default_extensions() -> Vec<SupportedExtension> {
    SupportedExtension::ALL.to_vec()
}
