use std::{io, path::PathBuf, time::Duration};

use lofty::error::LoftyError;
use notify::Error as NotifyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum StabilityError {
    #[error("file vanished while waiting for it to settle: {0}")]
    Vanished(PathBuf),

    #[error("file {path} did not settle within {after:?}")]
    TimedOut { path: PathBuf, after: Duration },
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Notify watcher error: {0}")]
    Notify(#[from] NotifyError),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Lofty(#[from] LoftyError),

    #[error("I/O: {0}")]
    Io(#[from] io::Error),

    #[error("codec task failed: {0}")]
    Task(String),

    #[error("container does not accept tags: {0}")]
    TagUnsupported(String),
}

#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("could not create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rendered path escapes the target directory: {0}")]
    Escape(String),

    #[error("rendered path has no file name: {0}")]
    EmptyName(String),

    #[error("could not claim {path}")]
    Claim {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no free name left for {0}")]
    Exhausted(PathBuf),

    #[error("could not rename {from} -> {to}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not copy {from} -> {to}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Etapa en la que se cortó el procesamiento de un archivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Stabilizing,
    Keyword,
    Lookup,
    TagWrite,
    Placement,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Stabilizing => "stabilizing",
            Stage::Keyword => "keyword",
            Stage::Lookup => "lookup",
            Stage::TagWrite => "tag-write",
            Stage::Placement => "placement",
        };
        f.write_str(s)
    }
}

/// Estado terminal `Aborted(..)` de una ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Vanished,
    NoKeyword,
    LookupFailed,
    WriteFailed,
    PlacementFailed,
    TimedOut,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("file vanished: {0}")]
    Vanished(PathBuf),

    #[error("no keyword could be derived from tags or inference")]
    NoKeyword,

    #[error("lookup failed: {0:#}")]
    LookupFailed(#[source] anyhow::Error),

    #[error("tag codec failed")]
    WriteFailed(#[source] CodecError),

    #[error("container not supported by any registered codec: {0}")]
    UnsupportedContainer(String),

    #[error("placement failed")]
    PlacementFailed(#[source] PlacementError),

    #[error("{stage} timed out after {after:?}")]
    TimedOut { stage: Stage, after: Duration },
}

impl IngestError {
    pub fn reason(&self) -> AbortReason {
        match self {
            IngestError::Vanished(_) => AbortReason::Vanished,
            IngestError::NoKeyword => AbortReason::NoKeyword,
            IngestError::LookupFailed(_) => AbortReason::LookupFailed,
            IngestError::WriteFailed(_) | IngestError::UnsupportedContainer(_) => AbortReason::WriteFailed,
            IngestError::PlacementFailed(_) => AbortReason::PlacementFailed,
            IngestError::TimedOut { .. } => AbortReason::TimedOut,
        }
    }
}

impl From<StabilityError> for IngestError {
    fn from(e: StabilityError) -> Self {
        match e {
            StabilityError::Vanished(p) => IngestError::Vanished(p),
            StabilityError::TimedOut { after, .. } => IngestError::TimedOut {
                stage: Stage::Stabilizing,
                after,
            },
        }
    }
}
