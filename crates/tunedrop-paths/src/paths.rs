use std::{env, fs::File, path::PathBuf};

use directories::ProjectDirs;

use crate::{errors::Error, fs_utils};

/// Nombre de la ENV var para override de ruta base (modo “portable”)
pub const ENV_BASE_DIR: &str = "TUNEDROP_BASE_DIR";

/// Contenedor de todas las rutas y ficheros importantes del servicio
#[derive(Debug)]
pub struct TunedropPaths {
    // config_dir
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,

    // data_dir
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub log_file: PathBuf,

    // lock_file
    pub lock_file: PathBuf,
}

impl TunedropPaths {
    pub fn new() -> Result<Self, Error> {
        // 1) Calculamos config_dir y data_dir
        let (config_dir, data_dir) = if let Ok(base) = env::var(ENV_BASE_DIR) {
            let b = PathBuf::from(base);
            (b.join("config"), b.join("data"))
        } else {
            let proj = ProjectDirs::from("org", "tunedrop", "tunedrop").ok_or(Error::NoHome)?;
            (proj.config_dir().to_path_buf(), proj.data_dir().to_path_buf())
        };

        // 2) Inicializamos las rutas (sin crear nada aún)
        let logs_dir = data_dir.join("logs");
        let paths = TunedropPaths {
            config_dir: config_dir.clone(),
            settings_file: config_dir.join("settings.toml"),

            data_dir: data_dir.clone(),
            log_file: logs_dir.join("tunedrop.log"),
            logs_dir,

            lock_file: data_dir.join("tunedrop.lock"),
        };

        // 3) Creamos la estructura y verificamos que es escribible
        paths.ensure_structure()?;
        paths.validate_structure()?;

        Ok(paths)
    }

    /// Devuelve true si el fichero de ajustes aún no existe o está vacío.
    pub fn is_first_run(&self) -> bool {
        std::fs::metadata(&self.settings_file)
            .map(|m| m.len() == 0)
            .unwrap_or(true)
    }

    /// Adquiere el lock de instancia única en tunedrop.lock.
    /// Mantén vivo el File retornado para conservar el lock.
    pub fn lock(&self) -> Result<File, Error> {
        fs_utils::lock_file(&self.lock_file)
    }
}

impl TunedropPaths {
    /// Se asegura de que los dirs básicos y el fichero de log existen.
    /// El fichero de ajustes NO se crea aquí: su ausencia marca el primer arranque.
    pub fn ensure_structure(&self) -> Result<(), Error> {
        fs_utils::ensure_dir(&self.config_dir)?;
        fs_utils::ensure_dir(&self.data_dir)?;
        fs_utils::ensure_dir(&self.logs_dir)?;

        fs_utils::ensure_file(&self.log_file)?;

        Ok(())
    }

    /// Valida que cada carpeta existe Y es escribible. Si falta, la intenta crear.
    pub fn validate_structure(&self) -> Result<(), Error> {
        for dir in [&self.config_dir, &self.data_dir, &self.logs_dir] {
            if !dir.exists() {
                fs_utils::ensure_dir(dir)?;
            }
            fs_utils::check_writable(dir)?;
        }
        Ok(())
    }
}
