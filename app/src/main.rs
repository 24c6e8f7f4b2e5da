mod logging;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info};
use tunedrop_clients::{NeteaseClient, OpenAiClient};
use tunedrop_ingest::{CodecRegistry, DirectoryWatcher, IngestConfig, IngestPipeline, WatchError};
use tunedrop_paths::try_paths;

/// Vigila una carpeta, etiqueta la música nueva y la archiva en la biblioteca.
#[derive(Parser, Debug)]
#[command(name = "tunedrop", version, about)]
struct Args {
    /// Fichero de configuración (por defecto, settings.toml en la carpeta de config)
    #[arg(short, long, env = "TUNEDROP_CONFIG")]
    config: Option<PathBuf>,

    /// Filtro de logs (`info`, `tunedrop_ingest=debug`, ...). Tiene prioridad sobre RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    /// Imprime la configuración por defecto y sale
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        print!("{}", IngestConfig::default().to_toml()?);
        return Ok(());
    }

    // 1) Rutas, logs y lock de instancia única
    let paths = try_paths().map_err(|e| anyhow!("no se pudieron preparar las rutas: {e}"))?;
    logging::init(&paths.log_file, args.log_level.as_deref())?;

    let _lock = paths
        .lock()
        .context("ya hay otra instancia de tunedrop en marcha")?;

    // 2) Configuración (primer arranque → escribir defaults y salir)
    let config_path = args.config.unwrap_or_else(|| paths.settings_file.clone());
    if !config_path.exists() || (config_path == paths.settings_file && paths.is_first_run()) {
        IngestConfig::write_default(&config_path)?;
        info!(path = %config_path.display(), "configuración por defecto creada");
        println!(
            "Se creó {}. Rellena directory.source y directory.target y vuelve a arrancar.",
            config_path.display()
        );
        return Ok(());
    }

    let config = IngestConfig::from_file(&config_path)
        .with_context(|| format!("configuración inválida en {}", config_path.display()))?;

    if config.mover.enabled {
        std::fs::create_dir_all(&config.directory.target)
            .with_context(|| format!("no se pudo crear {}", config.directory.target.display()))?;
    }

    // 3) Clientes + pipeline
    let inference = Arc::new(OpenAiClient::new(&config.ai));
    let catalog = Arc::new(NeteaseClient::new(&config.catalog));
    let pipeline = Arc::new(IngestPipeline::new(
        &config,
        inference,
        catalog,
        CodecRegistry::with_lofty(),
    )?);

    // 4) Watcher
    let watcher = DirectoryWatcher::from_config(&config);
    let handle = match watcher.watch(&config.directory.source, move |path| {
        let pipeline = pipeline.clone();
        async move { pipeline.handle(path).await }
    }) {
        Ok(handle) => handle,
        Err(e @ WatchError::MissingRoot(_)) => {
            error!(error = %e, "la carpeta de origen no existe");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        source = %config.directory.source.display(),
        target = %config.directory.target.display(),
        "tunedrop en marcha"
    );

    shutdown_signal().await;
    info!("apagando, esperando a las ejecuciones en curso");
    handle.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "no se pudo escuchar Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "no se pudo escuchar SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "tunedrop",
            "--config",
            "/tmp/tunedrop.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config.as_deref(), Some(std::path::Path::new("/tmp/tunedrop.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(!args.print_default_config);
    }

    #[test]
    fn default_config_is_printable() {
        let toml = IngestConfig::default().to_toml().unwrap();
        assert!(toml.contains("[directory]"));
    }
}
