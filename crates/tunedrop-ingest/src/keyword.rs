use std::{path::Path, sync::Arc};

use tracing::{debug, instrument};

use crate::{error::IngestError, metadata::TrackMetadata, traits::InferenceClient};

/// Saca la cadena de búsqueda de las etiquetas o, si no alcanza, del modelo.
#[derive(Clone)]
pub struct KeywordResolver {
    inference: Arc<dyn InferenceClient>,
    prompt_template: String,
}

impl std::fmt::Debug for KeywordResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordResolver")
            .field("prompt_template", &self.prompt_template)
            .finish_non_exhaustive()
    }
}

impl KeywordResolver {
    pub fn new(inference: Arc<dyn InferenceClient>, prompt_template: impl Into<String>) -> Self {
        KeywordResolver {
            inference,
            prompt_template: prompt_template.into(),
        }
    }

    /// `"title,artist"` si la etiqueta trae ambos.
    pub fn from_tags(tag: &TrackMetadata) -> Option<String> {
        let title = tag.title()?;
        let artist = tag.first_artist()?;
        Some(format!("{title},{artist}"))
    }

    pub fn build_prompt(&self, path: &Path) -> String {
        self.prompt_template.replace("{path}", &path.display().to_string())
    }

    /// Cadena vacía = no hay palabra clave. Nunca se mezclan etiqueta e inferencia.
    #[instrument(level = "debug", skip(self, existing), err)]
    pub async fn resolve(&self, existing: &TrackMetadata, path: &Path) -> Result<String, IngestError> {
        if let Some(keyword) = Self::from_tags(existing) {
            debug!(%keyword, "palabra clave desde etiquetas");
            return Ok(keyword);
        }

        let prompt = self.build_prompt(path);
        let inferred = self
            .inference
            .infer(&prompt)
            .await
            .map_err(IngestError::LookupFailed)?;

        let keyword = inferred.map(|s| s.trim().to_string()).unwrap_or_default();
        debug!(%keyword, "palabra clave inferida");
        Ok(keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TrackMetadataBuilder;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    struct FakeInference {
        answer: Option<String>,
        fail: bool,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeInference {
        fn answering(answer: Option<&str>) -> Arc<Self> {
            Arc::new(FakeInference {
                answer: answer.map(str::to_string),
                fail: false,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(FakeInference {
                answer: None,
                fail: true,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl InferenceClient for FakeInference {
        async fn infer(&self, prompt: &str) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                anyhow::bail!("model offline");
            }
            Ok(self.answer.clone())
        }
    }

    const PATH: &str = "/in/01 Track.mp3";

    #[tokio::test]
    async fn tags_win_without_calling_inference() {
        let fake = FakeInference::answering(Some("ignored"));
        let resolver = KeywordResolver::new(fake.clone(), "{path}");
        let tag = TrackMetadataBuilder::default()
            .title("Song")
            .artists(vec!["Artist".to_string(), "Other".to_string()])
            .build()
            .unwrap();

        assert_eq!(resolver.resolve(&tag, Path::new(PATH)).await.unwrap(), "Song,Artist");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn title_without_artist_falls_back_to_inference() {
        let fake = FakeInference::answering(Some("  Song,Artist,Album \n"));
        let resolver = KeywordResolver::new(fake.clone(), "guess: {path}");
        let tag = TrackMetadataBuilder::default().title("Song").build().unwrap();

        assert_eq!(
            resolver.resolve(&tag, Path::new(PATH)).await.unwrap(),
            "Song,Artist,Album"
        );
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake.prompts.lock().unwrap()[0], format!("guess: {PATH}"));
    }

    #[tokio::test]
    async fn empty_inference_yields_empty_keyword() {
        for answer in [None, Some(""), Some("   ")] {
            let fake = FakeInference::answering(answer);
            let resolver = KeywordResolver::new(fake.clone(), "{path}");
            let kw = resolver.resolve(&TrackMetadata::default(), Path::new(PATH)).await.unwrap();
            assert_eq!(kw, "");
            assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn inference_errors_are_lookup_failures() {
        let fake = FakeInference::failing();
        let resolver = KeywordResolver::new(fake.clone(), "{path}");
        let res = resolver.resolve(&TrackMetadata::default(), Path::new(PATH)).await;
        assert!(matches!(res, Err(IngestError::LookupFailed(_))));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }
}
