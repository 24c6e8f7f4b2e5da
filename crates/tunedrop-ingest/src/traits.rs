use crate::metadata::TrackMetadata;

/// Modelo de lenguaje que adivina título/artista a partir de una ruta.
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    /// `Ok(None)` cuando el modelo no devuelve nada utilizable.
    async fn infer(&self, prompt: &str) -> anyhow::Result<Option<String>>;
}

/// Catálogo remoto de canciones. La política de "mejor resultado" es cosa
/// de cada implementación.
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    async fn search(&self, keyword: &str) -> anyhow::Result<TrackMetadata>;
}
