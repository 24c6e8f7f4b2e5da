use std::{io, path::PathBuf};

use crate::paths::ENV_BASE_DIR;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Sin $HOME no hay dónde dejar ajustes ni logs
    #[error("no home directory available; set {} to pick a base directory", ENV_BASE_DIR)]
    NoHome,

    /// Otro tunedrop ya vigila con este lock
    #[error("tunedrop is already running (lock held on {})", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("{} is not writable", .0.display())]
    NotWritable(PathBuf),

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}
