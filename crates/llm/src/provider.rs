use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use snafu::Snafu;

use super::model::Model;
use super::wire::ChatRequest;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Self {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        Self {
            endpoint: if endpoint.is_empty() {
                DEFAULT_ENDPOINT.to_string()
            } else {
                endpoint
            },
            request_timeout,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_REQUEST_TIMEOUT)
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
/// Response body split into text lines, in arrival order.
pub type LineStream = Pin<Box<dyn Stream<Item = LlmResult<String>> + Send>>;
pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LlmError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("could not reach {url}: {source}"))]
    SendRequest {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("{url} returned status {status}: {body}"))]
    ResponseStatus {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to read response stream: {source}"))]
    ReadStream {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode model list: {source}"))]
    DecodeModels {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("server returned an empty model list"))]
    EmptyModelList { stage: &'static str },
}

/// Seam between the stream worker and the inference server.
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Lists installed models, in server order.
    fn fetch_models<'a>(&'a self) -> BoxFuture<'a, LlmResult<Vec<Model>>>;

    /// Sends a streaming chat request; resolves once the response head has arrived.
    fn open_chat<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, LlmResult<LineStream>>;
}
