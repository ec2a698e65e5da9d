use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// A text-completion backend. Returns the raw completion, or an empty string
/// when the service answered without content.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ExtractionError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Usually filled from `OPENAI_API_KEY` rather than the config file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4-1106-preview".to_string(),
            temperature: 0.9,
            timeout_secs: 300,
            api_key: None,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: String, model: String, temperature: f32, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            timeout,
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, ExtractionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ExtractionError::MissingCredential(OPENAI_API_KEY_VAR))?;
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let chat: ChatResponse = response.json().await.map_err(ExtractionError::Decode)?;

        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ExtractionError>> + Send {
        self.generate(prompt)
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, temperature: f32, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, ExtractionError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let ollama_response: OllamaResponse =
            response.json().await.map_err(ExtractionError::Decode)?;

        Ok(ollama_response.response)
    }
}

impl CompletionClient for OllamaClient {
    fn complete(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ExtractionError>> + Send {
        self.generate(prompt)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ExtractionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "Completion request failed");
    Err(ExtractionError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

/// The configured provider.
#[derive(Clone)]
pub enum LlmClient {
    OpenAi(OpenAiClient),
    Ollama(OllamaClient),
}

impl LlmClient {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let timeout = Duration::from_secs(settings.timeout_secs);
        match settings.provider {
            Provider::OpenAi => LlmClient::OpenAi(
                OpenAiClient::new(
                    settings.base_url.clone(),
                    settings.model.clone(),
                    settings.temperature,
                    timeout,
                )
                .with_api_key(settings.api_key.clone()),
            ),
            Provider::Ollama => LlmClient::Ollama(OllamaClient::new(
                settings.base_url.clone(),
                settings.model.clone(),
                settings.temperature,
                timeout,
            )),
        }
    }
}

impl CompletionClient for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractionError> {
        match self {
            LlmClient::OpenAi(client) => client.generate(prompt).await,
            LlmClient::Ollama(client) => client.generate(prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn openai(base_url: String, api_key: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(base_url, "gpt-4-1106-preview".into(), 0.9, Duration::from_secs(5))
            .with_api_key(api_key.map(str::to_string))
    }

    #[tokio::test]
    async fn test_openai_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4-1106-preview",
                "temperature": 0.9,
                "messages": [{"role": "user", "content": "PROMPT"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"(A, B, C)"}}]}"#)
            .create_async()
            .await;

        let text = openai(server.url(), Some("sk-test")).complete("PROMPT").await.unwrap();

        assert_eq!(text, "(A, B, C)");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_absent_content_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let text = openai(server.url(), Some("sk-test")).complete("PROMPT").await.unwrap();

        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_openai_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = openai(server.url(), Some("sk-test"))
            .complete("PROMPT")
            .await
            .unwrap_err();

        match err {
            ExtractionError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_openai_requires_credential() {
        let err = openai("http://127.0.0.1:9".into(), Some("  "))
            .complete("PROMPT")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::MissingCredential(OPENAI_API_KEY_VAR)));
    }

    #[tokio::test]
    async fn test_ollama_generate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3",
                "stream": false,
                "options": {"temperature": 0.5}
            })))
            .with_status(200)
            .with_body(r#"{"response":"(Nevada, is a, state)","done":true}"#)
            .create_async()
            .await;

        let client = LlmClient::from_settings(&LlmSettings {
            provider: Provider::Ollama,
            base_url: format!("{}/", server.url()),
            model: "llama3".into(),
            temperature: 0.5,
            ..LlmSettings::default()
        });

        assert_eq!(client.complete("PROMPT").await.unwrap(), "(Nevada, is a, state)");
        mock.assert_async().await;
    }
}
