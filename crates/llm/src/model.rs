use std::sync::Arc;

use tokio::sync::RwLock;

use super::provider::{ChatTransport, EmptyModelListSnafu, LlmResult};

pub const DEFAULT_MODEL: &str = "llama3.2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub name: String,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCatalogSource {
    ServerApi,
    CacheStaleFallback,
    StaticFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    pub models: Vec<Model>,
    pub source: ModelCatalogSource,
    pub warning: Option<String>,
}

impl ModelCatalog {
    pub fn from_server_api(models: Vec<Model>) -> Self {
        Self {
            models,
            source: ModelCatalogSource::ServerApi,
            warning: None,
        }
    }

    pub fn from_cache_stale(models: Vec<Model>, warning: String) -> Self {
        Self {
            models,
            source: ModelCatalogSource::CacheStaleFallback,
            warning: Some(warning),
        }
    }

    pub fn from_static_fallback(warning: String) -> Self {
        Self {
            models: default_models(),
            source: ModelCatalogSource::StaticFallback,
            warning: Some(warning),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|model| model.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|model| model.name.as_str())
    }
}

/// Last model list the server returned, served when a later refresh fails.
#[derive(Default)]
pub struct ModelCache {
    models: RwLock<Option<Vec<Model>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Vec<Model>> {
        self.models.read().await.clone()
    }

    pub async fn set(&self, models: Vec<Model>) {
        *self.models.write().await = Some(models);
    }
}

pub fn default_models() -> Vec<Model> {
    vec![Model::new(DEFAULT_MODEL)]
}

/// Asks the server for its models, falling back to the cached list and then to the default model.
pub async fn fetch_model_catalog(
    transport: &dyn ChatTransport,
    cache: &Arc<ModelCache>,
) -> ModelCatalog {
    match fetch_non_empty(transport).await {
        Ok(models) => {
            cache.set(models.clone()).await;
            ModelCatalog::from_server_api(models)
        }
        Err(error) => {
            let error_message = error.to_string();

            if let Some(models) = cache.get().await {
                tracing::warn!(
                    transport = transport.name(),
                    cached_model_count = models.len(),
                    error = %error_message,
                    "model fetch failed; serving stale cached models"
                );
                return ModelCatalog::from_cache_stale(models, error_message);
            }

            tracing::warn!(
                transport = transport.name(),
                error = %error_message,
                "model fetch failed without cache; serving default model"
            );
            ModelCatalog::from_static_fallback(error_message)
        }
    }
}

async fn fetch_non_empty(transport: &dyn ChatTransport) -> LlmResult<Vec<Model>> {
    let models = transport.fetch_models().await?;
    if models.is_empty() {
        return EmptyModelListSnafu {
            stage: "fetch-model-catalog",
        }
        .fail();
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::provider::{BoxFuture, LineStream, LlmError};
    use crate::wire::ChatRequest;

    struct CannedModels {
        responses: Mutex<Vec<LlmResult<Vec<Model>>>>,
    }

    impl CannedModels {
        fn new(responses: Vec<LlmResult<Vec<Model>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl ChatTransport for CannedModels {
        fn name(&self) -> &str {
            "canned"
        }

        fn fetch_models<'a>(&'a self) -> BoxFuture<'a, LlmResult<Vec<Model>>> {
            let next = self.responses.lock().unwrap().remove(0);
            Box::pin(async move { next })
        }

        fn open_chat<'a>(
            &'a self,
            _request: &'a ChatRequest,
        ) -> BoxFuture<'a, LlmResult<LineStream>> {
            unreachable!("model tests never open a chat")
        }
    }

    fn unreachable_error() -> LlmError {
        LlmError::EmptyModelList { stage: "test" }
    }

    #[tokio::test]
    async fn server_models_are_cached() {
        let transport = CannedModels::new(vec![
            Ok(vec![Model::new("llava"), Model::new("mistral")]),
            Err(unreachable_error()),
        ]);
        let cache = Arc::new(ModelCache::new());

        let fresh = fetch_model_catalog(&transport, &cache).await;
        assert_eq!(fresh.source, ModelCatalogSource::ServerApi);
        assert!(fresh.contains("llava"));

        let stale = fetch_model_catalog(&transport, &cache).await;
        assert_eq!(stale.source, ModelCatalogSource::CacheStaleFallback);
        assert_eq!(stale.names().collect::<Vec<_>>(), vec!["llava", "mistral"]);
        assert!(stale.warning.is_some());
    }

    #[tokio::test]
    async fn failure_without_cache_serves_default_model() {
        let transport = CannedModels::new(vec![Err(unreachable_error())]);
        let catalog = fetch_model_catalog(&transport, &Arc::new(ModelCache::new())).await;

        assert_eq!(catalog.source, ModelCatalogSource::StaticFallback);
        assert_eq!(catalog.models, default_models());
    }

    #[tokio::test]
    async fn empty_list_counts_as_failure() {
        let transport = CannedModels::new(vec![Ok(Vec::new())]);
        let catalog = fetch_model_catalog(&transport, &Arc::new(ModelCache::new())).await;

        assert_eq!(catalog.source, ModelCatalogSource::StaticFallback);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec![DEFAULT_MODEL]);
    }
}
