use std::process::ExitCode;
use std::sync::Arc;

use ganesha::app::TerminalApp;
use ganesha::chat::ChatController;
use ganesha::settings::SettingsStore;
use ganesha_llm::OllamaClient;
use ganesha_storage::Persistence;

#[tokio::main]
async fn main() -> ExitCode {
    ganesha::logging::init();

    let settings = SettingsStore::load().settings().clone();
    let transport = match OllamaClient::new(settings.client_config()) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            tracing::error!(error = %error, "failed to build inference client");
            return ExitCode::FAILURE;
        }
    };

    let controller = ChatController::new(
        transport,
        Persistence::new(settings.data_dir()),
        settings.default_model(),
    );

    match TerminalApp::new(controller).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "terminal session failed");
            ExitCode::FAILURE
        }
    }
}
