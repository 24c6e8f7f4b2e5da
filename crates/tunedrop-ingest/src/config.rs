use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    extensions::{SupportedExtension, default_extensions},
    placement::PlacementTemplate,
};

/// Prefijo de las variables de entorno: `TUNEDROP__MOVER__MODE=copy`
pub const ENV_PREFIX: &str = "TUNEDROP";

pub const DEFAULT_TEMPLATE: &str = "{performers}/{album}/{track}.{title}{extension}";

pub const DEFAULT_PROMPT: &str = "You are given the path of a music file. Work out the song title, \
the main artist and, if present, the album. Answer with a single line in the form \
`title,artist,album` and nothing else.\nPath: {path}";

/// Modo de colocación en el árbol destino
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMode {
    #[default]
    Move,
    Copy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct DirectoryConfig {
    pub source: PathBuf,
    pub target: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct MoverConfig {
    pub enabled: bool,
    pub rename: bool,
    pub mode: PlacementMode,
    #[serde(alias = "namingTemplate", alias = "namingtemplate")]
    pub naming_template: String,
}

impl Default for MoverConfig {
    fn default() -> Self {
        MoverConfig {
            enabled: true,
            rename: true,
            mode: PlacementMode::Move,
            naming_template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct WatcherConfig {
    pub extensions: Vec<SupportedExtension>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Sondeos consecutivos sin cambios antes de dar el archivo por estable
    pub stable_polls: u32,
    #[serde(with = "humantime_serde")]
    pub stability_timeout: Option<Duration>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            extensions: default_extensions(),
            poll_interval: Duration::from_secs(1),
            stable_polls: 5,
            stability_timeout: Some(Duration::from_secs(10 * 60)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Archivos procesándose a la vez
    pub max_concurrent: usize,
    /// Límite para cada llamada externa (inferencia, catálogo)
    #[serde(with = "humantime_serde")]
    pub call_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_concurrent: num_cpus::get().max(1),
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct AiConfig {
    #[serde(alias = "baseUrl", alias = "baseurl")]
    pub base_url: String,
    #[serde(alias = "apiKey", alias = "apikey")]
    pub api_key: String,
    #[serde(alias = "modelName", alias = "modelname")]
    pub model_name: String,
    /// Plantilla del prompt; `{path}` se sustituye por la ruta del archivo
    pub prompt: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model_name: "gpt-4o-mini".into(),
            prompt: DEFAULT_PROMPT.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct CatalogConfig {
    #[serde(alias = "baseUrl", alias = "baseurl")]
    pub base_url: String,
    /// Resultados de búsqueda que se consideran
    pub search_limit: usize,
    /// Descarta versiones cover al elegir el mejor resultado
    pub skip_cover_versions: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            base_url: "http://localhost:3000".into(),
            search_limit: 3,
            skip_cover_versions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct IngestConfig {
    pub directory: DirectoryConfig,
    pub mover: MoverConfig,
    pub watcher: WatcherConfig,
    pub pipeline: PipelineConfig,
    #[serde(alias = "AI")]
    pub ai: AiConfig,
    pub catalog: CatalogConfig,
}

impl IngestConfig {
    /// Carga defaults ← fichero (formato según extensión) ← entorno.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let ic = cfg.try_deserialize::<IngestConfig>()?;
        ic.validate()?;
        Ok(ic)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Escribe la configuración por defecto en `path` (creando la carpeta padre).
    pub fn write_default(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, IngestConfig::default().to_toml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.directory.source.as_os_str().is_empty() {
            return invalid("directory.source is empty");
        }
        if self.mover.enabled && self.directory.target.as_os_str().is_empty() {
            return invalid("directory.target is empty while the mover is enabled");
        }
        if self.mover.enabled && self.directory.source == self.directory.target {
            return invalid("directory.source and directory.target must differ");
        }
        if self.watcher.extensions.is_empty() {
            return invalid("watcher.extensions is empty");
        }
        if self.watcher.stable_polls == 0 {
            return invalid("watcher.stable_polls must be at least 1");
        }
        if self.watcher.poll_interval.is_zero() {
            return invalid("watcher.poll_interval must be greater than zero");
        }
        if self.pipeline.max_concurrent == 0 {
            return invalid("pipeline.max_concurrent must be at least 1");
        }
        if self.mover.rename {
            PlacementTemplate::parse(&self.mover.naming_template).map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }
}
