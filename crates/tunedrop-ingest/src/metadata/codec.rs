use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use tokio::task::spawn_blocking;
use tracing::debug;

use crate::{
    error::CodecError,
    extensions::SupportedExtension,
    metadata::{lofty::LoftyCodec, merge::merge, model::TrackMetadata},
};

/// Lectura/escritura de etiquetas sobre un contenedor concreto.
///
/// Las implementaciones son bloqueantes; el registro las ejecuta en
/// `spawn_blocking`.
pub trait TagCodec: Send + Sync {
    fn read(&self, path: &Path) -> Result<TrackMetadata, CodecError>;

    fn write(&self, path: &Path, tag: &TrackMetadata) -> Result<(), CodecError>;
}

/// Resultado de `merge_and_write`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Etiqueta fusionada y persistida
    Written(TrackMetadata),
    /// No hay codec para el contenedor: la fusión se calculó pero no se guardó
    Unsupported(TrackMetadata),
}

/// Codecs indexados por extensión. Un formato nuevo se registra, no se ramifica.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<SupportedExtension, Arc<dyn TagCodec>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exts: Vec<_> = self.codecs.keys().map(|e| e.as_str()).collect();
        exts.sort_unstable();
        f.debug_struct("CodecRegistry").field("extensions", &exts).finish()
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `LoftyCodec` para todas las extensiones conocidas.
    pub fn with_lofty() -> Self {
        let lofty: Arc<dyn TagCodec> = Arc::new(LoftyCodec);
        let mut registry = Self::new();
        for ext in SupportedExtension::ALL {
            registry.register(*ext, lofty.clone());
        }
        registry
    }

    pub fn register(&mut self, ext: SupportedExtension, codec: Arc<dyn TagCodec>) -> &mut Self {
        self.codecs.insert(ext, codec);
        self
    }

    pub fn get(&self, path: &Path) -> Option<Arc<dyn TagCodec>> {
        SupportedExtension::from_path(path).and_then(|ext| self.codecs.get(&ext).cloned())
    }

    /// Etiqueta existente. `None` si ningún codec maneja el contenedor.
    pub async fn read(&self, path: &Path) -> Result<Option<TrackMetadata>, CodecError> {
        let Some(codec) = self.get(path) else {
            return Ok(None);
        };

        let owned = path.to_path_buf();
        let tag = spawn_blocking(move || codec.read(&owned))
            .await
            .map_err(|e| CodecError::Task(e.to_string()))??;
        Ok(Some(tag))
    }

    pub async fn merge_and_write(
        &self,
        path: &Path,
        existing: &TrackMetadata,
        candidate: &TrackMetadata,
    ) -> Result<WriteOutcome, CodecError> {
        let merged = merge(existing, candidate);

        let Some(codec) = self.get(path) else {
            debug!(path = %path.display(), "sin codec para el contenedor, no se escribe");
            return Ok(WriteOutcome::Unsupported(merged));
        };

        let owned = path.to_path_buf();
        let tag = merged.clone();
        spawn_blocking(move || codec.write(&owned, &tag))
            .await
            .map_err(|e| CodecError::Task(e.to_string()))??;

        Ok(WriteOutcome::Written(merged))
    }
}
