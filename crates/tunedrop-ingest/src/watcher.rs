use std::{
    collections::HashSet,
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_walkdir::WalkDir;
use futures::{
    StreamExt,
    future::{BoxFuture, FutureExt, join_all},
};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{CreateKind, ModifyKind, RenameMode},
    recommended_watcher,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::IngestConfig,
    error::{IngestError, StabilityError, WatchError},
    extensions::SupportedExtension,
    pipeline::PipelineState,
    stability::StabilityDetector,
};

type FileHandler = Arc<dyn Fn(PathBuf) -> BoxFuture<'static, ()> + Send + Sync>;

/// Vigila un directorio de forma recursiva y entrega cada audio nuevo, ya
/// estable, al manejador.
#[derive(Debug, Clone)]
pub struct DirectoryWatcher {
    extensions: HashSet<SupportedExtension>,
    detector: StabilityDetector,
    ignored: Vec<PathBuf>,
}

/// Mantiene vivo el watcher. `shutdown` deja terminar lo que esté en curso.
pub struct WatchHandle {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub async fn shutdown(self) {
        // Sin watcher no queda emisor: el bucle drena y termina
        drop(self.watcher);
        if let Err(e) = self.task.await {
            error!(error = %e, "el bucle del watcher terminó con panic");
        }
    }
}

impl DirectoryWatcher {
    pub fn new(extensions: impl IntoIterator<Item = SupportedExtension>, detector: StabilityDetector) -> Self {
        DirectoryWatcher {
            extensions: extensions.into_iter().collect(),
            detector,
            ignored: Vec::new(),
        }
    }

    /// Extensiones y estabilidad según la configuración. El destino se ignora
    /// sólo cuando cuelga del origen (un origen dentro del destino se vigila).
    pub fn from_config(config: &IngestConfig) -> Self {
        let watcher = Self::new(
            config.watcher.extensions.iter().copied(),
            StabilityDetector::from_config(&config.watcher),
        );

        let source = canonical(&config.directory.source);
        let target = canonical(&config.directory.target);
        if config.mover.enabled && target != source && target.starts_with(&source) {
            watcher.ignore(target)
        } else {
            watcher
        }
    }

    /// Nada bajo `dir` dispara el manejador (p. ej. el destino anidado en el origen).
    pub fn ignore(mut self, dir: impl AsRef<Path>) -> Self {
        self.ignored.push(canonical(dir.as_ref()));
        self
    }

    pub fn accepts(&self, path: &Path) -> bool {
        SupportedExtension::from_path(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.iter().any(|dir| path.starts_with(dir))
    }

    /// Arranca la vigilancia. Los archivos que ya existían no se notifican.
    #[instrument(level = "debug", skip(self, on_file), err)]
    pub fn watch<F, Fut>(&self, root: &Path, on_file: F) -> Result<WatchHandle, WatchError>
    where
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !root.is_dir() {
            return Err(WatchError::MissingRoot(root.to_path_buf()));
        }
        let root = dunce::canonicalize(root).map_err(|_| WatchError::MissingRoot(root.to_path_buf()))?;

        // 1) notify → canal → bucle async
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        // 2) Estado compartido por todas las ejecuciones
        let handler: FileHandler = Arc::new(move |path| on_file(path).boxed());
        let shared = Arc::new(Shared {
            watcher: self.clone(),
            in_flight: Mutex::new(HashSet::new()),
            handler,
        });

        let task = tokio::spawn(event_loop(rx, shared));
        info!(root = %root.display(), "vigilando directorio");

        Ok(WatchHandle { watcher, task })
    }
}

struct Shared {
    watcher: DirectoryWatcher,
    in_flight: Mutex<HashSet<PathBuf>>,
    handler: FileHandler,
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Marca una ruta como "en curso" mientras vive.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<PathBuf>>, path: &Path) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
        inserted.then(|| InFlight {
            set,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Rutas de un evento que cuentan como llegada al árbol.
fn arrivals(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Folder | CreateKind::Any) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => event.paths,
        // [origen, destino]: sólo interesa el destino
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.into_iter().last().into_iter().collect(),
        _ => Vec::new(),
    }
}

async fn event_loop(mut rx: UnboundedReceiver<notify::Result<Event>>, shared: Arc<Shared>) {
    let mut runs = JoinSet::new();

    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) => {
                for path in arrivals(event) {
                    if !shared.watcher.is_ignored(&path) {
                        runs.spawn(shared.clone().arrived(path));
                    }
                }
            }
            Err(e) => warn!(error = %e, "error del watcher, sigo"),
        }

        while let Some(done) = runs.try_join_next() {
            if let Err(e) = done {
                error!(error = %e, "panic en una ejecución! sigo");
            }
        }
    }

    debug!(pending = runs.len(), "watcher cerrado, esperando ejecuciones en curso");
    while let Some(done) = runs.join_next().await {
        if let Err(e) = done {
            error!(error = %e, "panic en una ejecución");
        }
    }
}

impl Shared {
    /// Directorio → expandir; archivo de audio → estabilizar y procesar.
    async fn arrived(self: Arc<Self>, path: PathBuf) {
        let is_dir = tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir());
        if is_dir {
            self.expand_dir(path).await;
        } else if self.watcher.accepts(&path) {
            self.run_file(path).await;
        }
    }

    async fn run_file(self: Arc<Self>, path: PathBuf) {
        let Some(_guard) = InFlight::acquire(&self.in_flight, &path) else {
            debug!(path = %path.display(), "ya en curso, ignoro evento duplicado");
            return;
        };

        debug!(path = %path.display(), state = ?PipelineState::Stabilizing, "esperando a que se estabilice");
        match self.watcher.detector.await_stable(&path).await {
            Ok(()) => (self.handler)(path.clone()).await,
            Err(e) => {
                let quiet = matches!(e, StabilityError::Vanished(_));
                let e = IngestError::from(e);
                let state = PipelineState::Aborted(e.reason());
                if quiet {
                    debug!(path = %path.display(), ?state, error = %e, "descartado");
                } else {
                    warn!(path = %path.display(), ?state, error = %e, "descartado");
                }
            }
        }
    }

    /// Un directorio movido dentro del árbol no genera eventos por sus hijos.
    async fn expand_dir(self: Arc<Self>, dir: PathBuf) {
        let mut walker = WalkDir::new(&dir);
        let mut files = Vec::new();

        while let Some(next) = walker.next().await {
            match next {
                Ok(entry) => {
                    let path = entry.path();
                    let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                    if is_file && self.watcher.accepts(&path) && !self.watcher.is_ignored(&path) {
                        files.push(path);
                    }
                }
                Err(e) => warn!(?e, "walkdir error"),
            }
        }

        debug!(dir = %dir.display(), found = files.len(), "directorio nuevo expandido");
        join_all(files.into_iter().map(|p| self.clone().run_file(p))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::{sync::mpsc::UnboundedReceiver, time::timeout};

    fn watcher() -> DirectoryWatcher {
        DirectoryWatcher::new(
            SupportedExtension::ALL.iter().copied(),
            StabilityDetector::new(Duration::from_millis(20), 2),
        )
    }

    fn collect(w: &DirectoryWatcher, root: &Path) -> (WatchHandle, UnboundedReceiver<PathBuf>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = w
            .watch(root, move |p| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(p);
                }
            })
            .unwrap();
        (handle, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<PathBuf>) -> Option<PathBuf> {
        timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
    }

    async fn nothing_more(rx: &mut UnboundedReceiver<PathBuf>) -> bool {
        timeout(Duration::from_millis(400), rx.recv()).await.is_err()
    }

    #[test]
    fn filters_extensions_case_sensitively() {
        let w = DirectoryWatcher::new(
            [SupportedExtension::Mp3, SupportedExtension::Flac],
            StabilityDetector::new(Duration::from_millis(1), 1),
        );
        assert!(w.accepts(Path::new("/in/a.mp3")));
        assert!(w.accepts(Path::new("/in/a.flac")));
        assert!(!w.accepts(Path::new("/in/a.MP3")));
        assert!(!w.accepts(Path::new("/in/a.wav")));
        assert!(!w.accepts(Path::new("/in/notes.txt")));
    }

    #[tokio::test]
    async fn missing_root_fails_fast() {
        let dir = tempdir().unwrap();
        let res = watcher().watch(&dir.path().join("nope"), |_| async {});
        assert!(matches!(res, Err(WatchError::MissingRoot(_))));
    }

    #[tokio::test]
    async fn reports_new_audio_files_only() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("old.mp3"), b"old").unwrap();

        let (handle, mut rx) = collect(&watcher(), &root);

        std::fs::write(root.join("notes.txt"), b"x").unwrap();
        std::fs::write(root.join("LOUD.MP3"), b"x").unwrap();
        std::fs::write(root.join("new.mp3"), b"audio").unwrap();

        assert_eq!(next(&mut rx).await, Some(root.join("new.mp3")));
        assert!(nothing_more(&mut rx).await);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn ignores_files_under_ignored_dirs() {
        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        let out = root.join("library");
        std::fs::create_dir(&out).unwrap();

        let w = watcher().ignore(&out);
        let (handle, mut rx) = collect(&w, &root);

        std::fs::write(out.join("placed.mp3"), b"x").unwrap();
        std::fs::write(root.join("inbox.flac"), b"x").unwrap();

        assert_eq!(next(&mut rx).await, Some(root.join("inbox.flac")));
        assert!(nothing_more(&mut rx).await);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn inbox_inside_the_library_is_still_watched() {
        let dir = tempdir().unwrap();
        let library = dunce::canonicalize(dir.path()).unwrap();
        let inbox = library.join("inbox");
        std::fs::create_dir(&inbox).unwrap();

        let mut config = IngestConfig::default();
        config.directory.source = inbox.clone();
        config.directory.target = library.clone();
        config.validate().unwrap();

        let mut w = DirectoryWatcher::from_config(&config);
        w.detector = watcher().detector;
        let (handle, mut rx) = collect(&w, &inbox);

        std::fs::write(inbox.join("new.mp3"), b"audio").unwrap();
        assert_eq!(next(&mut rx).await, Some(inbox.join("new.mp3")));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn library_inside_the_inbox_is_ignored() {
        let dir = tempdir().unwrap();
        let inbox = dunce::canonicalize(dir.path()).unwrap();
        let library = inbox.join("library");
        std::fs::create_dir(&library).unwrap();

        let mut config = IngestConfig::default();
        config.directory.source = inbox.clone();
        config.directory.target = library.clone();

        let mut w = DirectoryWatcher::from_config(&config);
        w.detector = watcher().detector;
        let (handle, mut rx) = collect(&w, &inbox);

        std::fs::write(library.join("placed.mp3"), b"x").unwrap();
        std::fs::write(inbox.join("new.mp3"), b"x").unwrap();

        assert_eq!(next(&mut rx).await, Some(inbox.join("new.mp3")));
        assert!(nothing_more(&mut rx).await);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn directories_moved_in_are_expanded() {
        let outside = tempdir().unwrap();
        let album = outside.path().join("album");
        std::fs::create_dir(&album).unwrap();
        std::fs::write(album.join("01.flac"), b"x").unwrap();

        let dir = tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        let (handle, mut rx) = collect(&watcher(), &root);

        // Mismo sistema de ficheros que el temporal, rename atómico
        let moved = root.join("album");
        if std::fs::rename(&album, &moved).is_err() {
            handle.shutdown().await;
            return;
        }

        assert_eq!(next(&mut rx).await, Some(moved.join("01.flac")));
        handle.shutdown().await;
    }
}
