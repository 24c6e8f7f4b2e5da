use std::{
    fs::{self, File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::Path,
};

use fs2::FileExt;
use tracing::{Level, debug, instrument};

use crate::errors::Error;

/// Nombre del fichero de prueba de `check_writable`
const PROBE_NAME: &str = ".tunedrop-write-probe";

#[instrument(level = Level::TRACE, err)]
pub fn ensure_dir(path: &Path) -> Result<(), Error> {
    fs::create_dir_all(path).map_err(Error::io(path))
}

/// Crea `path` vacío si no existe. Nunca lo trunca.
#[instrument(level = Level::TRACE, err)]
pub fn ensure_file(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(drop)
        .map_err(Error::io(path))
}

/// Lock exclusivo sin bloquear. El PID del dueño queda escrito dentro.
/// El lock dura lo que viva el `File`.
#[instrument(level = Level::TRACE, err)]
pub fn lock_file(path: &Path) -> Result<File, Error> {
    ensure_file(path)?;
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(Error::io(path))?;

    if let Err(e) = file.try_lock_exclusive() {
        if e.kind() == fs2::lock_contended_error().kind() {
            return Err(Error::AlreadyRunning(path.to_path_buf()));
        }
        return Err(Error::io(path)(e));
    }

    // 1) PID para diagnosticar quién tiene el lock
    file.set_len(0)
        .and_then(|_| file.seek(SeekFrom::Start(0)))
        .and_then(|_| writeln!(file, "{}", std::process::id()))
        .map_err(Error::io(path))?;

    debug!(path = %path.display(), pid = std::process::id(), "lock de instancia adquirido");
    Ok(file)
}

/// Comprueba que se puede escribir en la carpeta `dir` creando y borrando un
/// fichero de prueba. Los bits de permiso no bastan (montajes ro, ACLs).
#[instrument(level = Level::TRACE, err)]
pub fn check_writable(dir: &Path) -> Result<(), Error> {
    let probe = dir.join(PROBE_NAME);
    match File::create(&probe) {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(Error::NotWritable(dir.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::ReadOnlyFilesystem => Err(Error::NotWritable(dir.to_path_buf())),
        Err(e) => Err(Error::io(dir)(e)),
    }
}
