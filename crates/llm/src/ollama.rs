use snafu::ResultExt;

use super::lines::lines_from_bytes;
use super::model::Model;
use super::provider::{
    BoxFuture, BuildHttpClientSnafu, ChatTransport, ClientConfig, DecodeModelsSnafu, LineStream,
    LlmResult, ResponseStatusSnafu, SendRequestSnafu,
};
use super::wire::{ChatRequest, TagsResponse};

pub const TAGS_PATH: &str = "/api/tags";
pub const CHAT_PATH: &str = "/api/chat";

/// HTTP transport for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> LlmResult<Self> {
        // The timeout bounds the whole exchange, body included.
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "ollama-client-new",
            })?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn fetch_tags(&self) -> LlmResult<Vec<Model>> {
        let url = self.config.url(TAGS_PATH);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-tags-request",
                url: url.clone(),
            })?;
        let response = ensure_success(response, &url, "tags-http-status").await?;

        let tags: TagsResponse = response.json().await.context(DecodeModelsSnafu {
            stage: "decode-tags-response",
        })?;

        Ok(tags
            .models
            .into_iter()
            .map(|model| model.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .map(Model::new)
            .collect())
    }

    async fn send_chat(&self, request: &ChatRequest) -> LlmResult<LineStream> {
        let url = self.config.url(CHAT_PATH);
        tracing::debug!(
            url = %url,
            model = %request.model,
            message_count = request.messages.len(),
            "sending chat request"
        );

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-chat-request",
                url: url.clone(),
            })?;
        let response = ensure_success(response, &url, "chat-http-status").await?;

        Ok(lines_from_bytes(response.bytes_stream()))
    }
}

async fn ensure_success(
    response: reqwest::Response,
    url: &str,
    stage: &'static str,
) -> LlmResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    ResponseStatusSnafu {
        stage,
        url: url.to_string(),
        status: status.as_u16(),
        body: body.trim().to_string(),
    }
    .fail()
}

impl ChatTransport for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, LlmResult<Vec<Model>>> {
        Box::pin(self.fetch_tags())
    }

    fn open_chat<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, LlmResult<LineStream>> {
        Box::pin(self.send_chat(request))
    }
}
