use ganesha_llm::{ModelCatalog, StreamEvent};

/// Everything background tasks hand to the presentation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Stream(StreamEvent),
    ModelsLoaded(ModelCatalog),
}

impl From<StreamEvent> for AppEvent {
    fn from(event: StreamEvent) -> Self {
        Self::Stream(event)
    }
}

impl From<ModelCatalog> for AppEvent {
    fn from(catalog: ModelCatalog) -> Self {
        Self::ModelsLoaded(catalog)
    }
}
