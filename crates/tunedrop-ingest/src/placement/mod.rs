mod template;

pub use template::{PlacementTemplate, sanitize_file_name};

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use tokio::{
    fs,
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
};
use tracing::{debug, instrument};

use crate::{error::PlacementError, metadata::TrackMetadata};

/// Límite de sufijos `_N` antes de rendirse
const MAX_SUFFIX: u32 = 10_000;

/// Coloca archivos en el árbol destino con nombres deterministas y sin colisiones.
#[derive(Debug)]
pub struct Placer {
    enabled: bool,
    /// `None` conserva el nombre original
    template: Option<PlacementTemplate>,
    target_dir: PathBuf,
    dir_locks: DirLocks,
}

type DirLocks = Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>;

/// Turno exclusivo sobre una carpeta destino. Al soltarse, si nadie más
/// espera por esa carpeta, su entrada sale del mapa.
struct DirTurn<'a> {
    locks: &'a DirLocks,
    dir: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DirTurn<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        if locks.get(&self.dir).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.dir);
        }
    }
}

impl Placer {
    pub fn new(enabled: bool, template: Option<PlacementTemplate>, target_dir: impl Into<PathBuf>) -> Self {
        Placer {
            enabled,
            template,
            target_dir: target_dir.into(),
            dir_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Mueve `working` a su destino final.
    ///
    /// `original` aporta el nombre y la extensión (en modo copia `working`
    /// es un temporal con nombre aleatorio). Devuelve la ruta reclamada.
    #[instrument(level = "debug", skip(self, tag), err)]
    pub async fn place(&self, working: &Path, original: &Path, tag: &TrackMetadata) -> Result<PathBuf, PlacementError> {
        // 1) Desactivado → no-op
        if !self.enabled {
            return Ok(working.to_path_buf());
        }

        // 2) Ruta relativa: plantilla o nombre original
        let extension = original.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let relative = match &self.template {
            Some(template) => template.render(tag, extension)?,
            None => original
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| PlacementError::EmptyName(original.display().to_string()))?,
        };

        let wanted = self.target_dir.join(relative);
        let dir = wanted.parent().unwrap_or(self.target_dir.as_path()).to_path_buf();

        // 3) Carpetas
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| PlacementError::CreateDir { path: dir.clone(), source })?;

        // 4) Reclamar nombre libre, serializado por carpeta
        let _turn = self.dir_turn(&dir).await;

        let claimed = claim(&wanted, extension).await?;

        // 5) Mover sobre el marcador
        if let Err(e) = move_file(working, &claimed).await {
            let _ = fs::remove_file(&claimed).await;
            return Err(e);
        }

        debug!(from = %working.display(), to = %claimed.display(), "archivo colocado");
        Ok(claimed)
    }

    async fn dir_turn(&self, dir: &Path) -> DirTurn<'_> {
        let lock = {
            let mut locks = self.dir_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(dir.to_path_buf()).or_default().clone()
        };
        let mut turn = DirTurn {
            locks: &self.dir_locks,
            dir: dir.to_path_buf(),
            guard: None,
        };
        turn.guard = Some(lock.lock_owned().await);
        turn
    }

    #[cfg(test)]
    fn tracked_dirs(&self) -> usize {
        self.dir_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// `stem.ext`, `stem_1.ext`, `stem_2.ext`… El primero que se pueda crear en
/// exclusiva queda reservado como fichero vacío.
async fn claim(wanted: &Path, extension: &str) -> Result<PathBuf, PlacementError> {
    let dir = wanted.parent().unwrap_or(Path::new(""));
    let name = wanted
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PlacementError::EmptyName(wanted.display().to_string()))?;

    let suffix = format!(".{extension}");
    let (stem, suffix) = match name.strip_suffix(&suffix) {
        Some(stem) if !extension.is_empty() => (stem, suffix.as_str()),
        _ => (name, ""),
    };

    for n in 0..=MAX_SUFFIX {
        let candidate = if n == 0 {
            wanted.to_path_buf()
        } else {
            dir.join(format!("{stem}_{n}{suffix}"))
        };

        match fs::OpenOptions::new().write(true).create_new(true).open(&candidate).await {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(PlacementError::Claim { path: candidate, source }),
        }
    }

    Err(PlacementError::Exhausted(wanted.to_path_buf()))
}

async fn move_file(from: &Path, to: &Path) -> Result<(), PlacementError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to).await.map_err(|source| PlacementError::Copy {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })?;
            fs::remove_file(from).await.map_err(|source| PlacementError::Rename {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(PlacementError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}
