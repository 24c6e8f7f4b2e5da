//! Crate `tunedrop_paths`: rutas por usuario, fichero de log y lock de instancia única

mod errors;
mod fs_utils;
mod paths;

pub use errors::Error;
pub use fs_utils::{check_writable, ensure_dir};
pub use paths::{ENV_BASE_DIR, TunedropPaths};

use once_cell::sync::Lazy;

/// Singleton global. Usa `try_paths` si quieres manejar el error.
pub static PATHS: Lazy<Result<TunedropPaths, Error>> = Lazy::new(TunedropPaths::new);

/// Acceso al singleton sin panics.
pub fn try_paths() -> Result<&'static TunedropPaths, &'static Error> {
    PATHS.as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// RAII-guard que setea y luego restaura (o elimina) una variable de entorno.
    struct EnvVarGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn new(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            // set_var es unsafe en edition 2024:
            unsafe { std::env::set_var(key, value) };
            EnvVarGuard {
                key: key.to_owned(),
                original,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => unsafe { std::env::set_var(&self.key, val) },
                None => unsafe { std::env::remove_var(&self.key) },
            }
        }
    }

    // Un solo test toca la ENV var para no pisarse entre hilos.
    #[test]
    fn new_creates_structure_and_lock_behavior() {
        let tmp = tempdir().unwrap();
        let _env = EnvVarGuard::new(ENV_BASE_DIR, tmp.path().to_str().unwrap());

        let paths = TunedropPaths::new().unwrap();

        assert_eq!(paths.config_dir, tmp.path().join("config"));
        assert!(paths.config_dir.exists());
        assert!(paths.data_dir.exists());
        assert!(paths.logs_dir.exists());
        assert!(paths.log_file.exists());

        // Ajustes aún no escritos → primer arranque
        assert!(!paths.settings_file.exists());
        assert!(paths.is_first_run());
        std::fs::write(&paths.settings_file, "[directory]\n").unwrap();
        assert!(!paths.is_first_run());

        // El primer lock funciona, el segundo choca
        let _lock_handle = paths.lock().unwrap();
        assert!(paths.lock_file.exists());
        match paths.lock() {
            Err(Error::AlreadyRunning(p)) => assert!(p.ends_with("tunedrop.lock")),
            other => panic!("Esperaba AlreadyRunning, obtuve {other:?}"),
        }

        // validate_structure recrea carpetas borradas en caliente
        std::fs::remove_dir_all(&paths.logs_dir).unwrap();
        paths.validate_structure().unwrap();
        assert!(paths.logs_dir.exists());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        check_writable(&nested).unwrap();
    }
}
