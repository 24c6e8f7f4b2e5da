use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use tunedrop_ingest::{InferenceClient, config::AiConfig};

use crate::error::ClientError;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Cliente para cualquier API compatible con `/chat/completions` de OpenAI.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model_name.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Un único mensaje de usuario; devuelve el contenido de la primera respuesta.
    #[instrument(level = "debug", skip(self, prompt), err)]
    pub async fn chat(&self, prompt: &str) -> Result<Option<String>, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.client.post(url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?.error_for_status()?;
        let response = response.json::<ChatResponse>().await?;

        let content = response.choices.into_iter().next().and_then(|c| c.message.content);
        debug!(?content, "respuesta del modelo");
        Ok(content)
    }
}

#[async_trait::async_trait]
impl InferenceClient for OpenAiClient {
    async fn infer(&self, prompt: &str) -> anyhow::Result<Option<String>> {
        Ok(self.chat(prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer, key: &str) -> OpenAiClient {
        OpenAiClient::new(&AiConfig {
            base_url: format!("{}/v1/", server.base_url()),
            api_key: key.into(),
            model_name: "tiny".into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer secret")
                .json_body(json!({
                    "model": "tiny",
                    "messages": [{"role": "user", "content": "who sings /in/a.mp3"}]
                }));
            then.status(200).json_body(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "Song,Artist"}},
                    {"message": {"role": "assistant", "content": "ignored"}}
                ]
            }));
        });

        let answer = client(&server, "secret").infer("who sings /in/a.mp3").await.unwrap();
        assert_eq!(answer.as_deref(), Some("Song,Artist"));
        mock.assert();
    }

    #[tokio::test]
    async fn no_choices_is_none() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        });

        assert_eq!(client(&server, "").chat("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn http_errors_surface() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).json_body(json!({"error": {"message": "bad key"}}));
        });

        let res = client(&server, "wrong").chat("x").await;
        assert!(matches!(res, Err(ClientError::Http(_))));
    }
}
