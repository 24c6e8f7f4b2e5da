//! Orquesta un archivo de principio a fin:
//! etiquetas → palabra clave → catálogo → escritura → colocación.
//!
//! Cada archivo es independiente; un fallo sólo aborta su propia ejecución.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::{fs, sync::Semaphore};
use tracing::{debug, info, warn};

use crate::{
    config::{IngestConfig, PlacementMode},
    error::{AbortReason, ConfigError, IngestError, PlacementError, Stage},
    keyword::KeywordResolver,
    metadata::{CodecRegistry, TrackMetadata, WriteOutcome},
    placement::{PlacementTemplate, Placer},
    traits::{CatalogClient, InferenceClient},
};

/// Carpeta oculta dentro del destino para las copias de trabajo
pub const WORK_DIR_NAME: &str = ".tunedrop-work";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Detected,
    Stabilizing,
    KeywordResolved,
    MetadataEnriched,
    TagWritten,
    Placed,
    Done,
    Aborted(AbortReason),
}

/// Seguimiento de estados de una ejecución
struct Run<'a> {
    path: &'a Path,
    state: PipelineState,
}

impl<'a> Run<'a> {
    /// El watcher ya esperó a que el archivo estuviera estable.
    fn start(path: &'a Path) -> Self {
        debug!(path = %path.display(), state = ?PipelineState::Detected, "nueva ejecución");
        Run {
            path,
            state: PipelineState::Detected,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!(path = %self.path.display(), from = ?self.state, to = ?next, "transición");
        self.state = next;
    }
}

/// Copia temporal usada en modo `copy`. Se borra al soltarse salvo que se
/// haya consumido.
struct WorkingCopy {
    path: PathBuf,
    armed: bool,
}

impl WorkingCopy {
    async fn create(target_dir: &Path, source: &Path) -> Result<Self, PlacementError> {
        let dir = target_dir.join(WORK_DIR_NAME);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| PlacementError::CreateDir { path: dir.clone(), source })?;

        let ext = source.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let path = dir.join(format!("{:016x}.{ext}", rand::random::<u64>()));

        if let Err(e) = fs::copy(source, &path).await {
            let _ = fs::remove_file(&path).await;
            return Err(PlacementError::Copy {
                from: source.to_path_buf(),
                to: path,
                source: e,
            });
        }

        Ok(WorkingCopy { path, armed: true })
    }

    fn consume(mut self) {
        self.armed = false;
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

pub struct IngestPipeline {
    keywords: KeywordResolver,
    catalog: Arc<dyn CatalogClient>,
    codecs: CodecRegistry,
    placer: Placer,
    mode: PlacementMode,
    call_timeout: Option<Duration>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("codecs", &self.codecs)
            .field("placer", &self.placer)
            .field("mode", &self.mode)
            .field("call_timeout", &self.call_timeout)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl IngestPipeline {
    pub fn new(
        config: &IngestConfig,
        inference: Arc<dyn InferenceClient>,
        catalog: Arc<dyn CatalogClient>,
        codecs: CodecRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let template = if config.mover.rename {
            Some(PlacementTemplate::parse(&config.mover.naming_template).map_err(ConfigError::Invalid)?)
        } else {
            None
        };

        Ok(IngestPipeline {
            keywords: KeywordResolver::new(inference, config.ai.prompt.clone()),
            catalog,
            codecs,
            placer: Placer::new(config.mover.enabled, template, config.directory.target.clone()),
            mode: config.mover.mode,
            call_timeout: config.pipeline.call_timeout,
            permits: Arc::new(Semaphore::new(config.pipeline.max_concurrent.max(1))),
        })
    }

    /// Punto de entrada para el watcher: procesa y registra el resultado.
    pub async fn handle(&self, path: PathBuf) {
        let _ = self.process(&path).await;
    }

    /// Procesa un archivo ya estable. Devuelve la ruta final.
    pub async fn process(&self, path: &Path) -> Result<PathBuf, IngestError> {
        let _permit = self.permits.acquire().await.ok();

        let mut run = Run::start(path);

        match self.run_stages(&mut run).await {
            Ok(dest) => {
                run.advance(PipelineState::Done);
                info!(path = %path.display(), dest = %dest.display(), "archivo procesado");
                Ok(dest)
            }
            Err(e) => {
                let reached = run.state;
                run.advance(PipelineState::Aborted(e.reason()));
                warn!(
                    path = %path.display(),
                    reached = ?reached,
                    reason = ?e.reason(),
                    error = %e,
                    "procesamiento abortado"
                );
                Err(e)
            }
        }
    }

    async fn run_stages(&self, run: &mut Run<'_>) -> Result<PathBuf, IngestError> {
        let path = run.path;

        // 1) Etiquetas existentes (contenedor sin codec → vacías)
        let existing = self
            .codecs
            .read(path)
            .await
            .map_err(IngestError::WriteFailed)?
            .unwrap_or_default();

        // 2) Palabra clave
        let keyword = self
            .bounded(Stage::Keyword, self.keywords.resolve(&existing, path))
            .await?;
        if keyword.is_empty() {
            return Err(IngestError::NoKeyword);
        }
        run.advance(PipelineState::KeywordResolved);

        // 3) Catálogo
        let candidate: TrackMetadata = self
            .bounded(Stage::Lookup, async {
                self.catalog
                    .search(&keyword)
                    .await
                    .map_err(IngestError::LookupFailed)
            })
            .await?;
        run.advance(PipelineState::MetadataEnriched);

        // 4) Copia de trabajo en modo copy
        let working = if self.placer.is_enabled() && self.mode == PlacementMode::Copy {
            Some(
                WorkingCopy::create(self.placer.target_dir(), path)
                    .await
                    .map_err(IngestError::PlacementFailed)?,
            )
        } else {
            None
        };
        let writable = working.as_ref().map(|w| w.path.as_path()).unwrap_or(path);

        // 5) Fusión + escritura
        let final_tag = match self.codecs.merge_and_write(writable, &existing, &candidate).await {
            Ok(WriteOutcome::Written(tag)) => tag,
            Ok(WriteOutcome::Unsupported(_)) => {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
                return Err(IngestError::UnsupportedContainer(ext.to_string()));
            }
            Err(e) => return Err(IngestError::WriteFailed(e)),
        };
        run.advance(PipelineState::TagWritten);

        // 6) Colocación
        let dest = self
            .placer
            .place(writable, path, &final_tag)
            .await
            .map_err(IngestError::PlacementFailed)?;
        if let Some(w) = working {
            w.consume();
        }
        run.advance(PipelineState::Placed);

        Ok(dest)
    }

    async fn bounded<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, IngestError>>,
    ) -> Result<T, IngestError> {
        match self.call_timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| IngestError::TimedOut { stage, after })?,
            None => fut.await,
        }
    }
}
