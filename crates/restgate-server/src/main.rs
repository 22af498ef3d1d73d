use std::sync::Arc;
use std::time::Duration;

use restgate_core::SubstitutionEngine;
use restgate_gateway::tls::HttpSecretEventSource;
use restgate_gateway::{
    AuthenticationService, ConnectivityRetriever, HttpExecutor, RunOrchestrator,
    SecretChangeWatcher, TlsContextStore,
};
use restgate_server::routes;
use restgate_server::{AppState, ResourceConfigurationStore, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    restgate_server::logging::init();
    let config = ServiceConfig::load()?;
    tracing::info!(listen = config.listen_address(), "starting restgate");

    let engine = Arc::new(SubstitutionEngine::new());
    let tls_store = Arc::new(TlsContextStore::new());
    let external_executor =
        Arc::new(HttpExecutor::external(tls_store.clone(), config.pool_settings()));
    let internal_executor = Arc::new(HttpExecutor::internal(config.pool_settings()));

    let connectivity = Arc::new(ConnectivityRetriever::new(
        internal_executor,
        config.connected_system.url.clone(),
        config.connected_system.subsystems_path.clone(),
        Duration::from_secs(config.connected_system.cache_access_expiry_seconds),
    ));
    let authentication = Arc::new(AuthenticationService::new(external_executor.clone()));
    let orchestrator = Arc::new(RunOrchestrator::new(
        engine,
        authentication,
        connectivity,
        external_executor,
    ));

    let _watcher = match &config.certificates.watch_url {
        Some(watch_url) => {
            let source = Arc::new(HttpSecretEventSource::new(watch_url.clone())?);
            Some(
                SecretChangeWatcher::start(
                    source,
                    tls_store,
                    config.certificates.secrets.clone(),
                    config.certificates.watcher.clone(),
                )
                .await?,
            )
        }
        None => {
            tracing::info!("certificate change watcher is disabled");
            None
        }
    };

    let state = AppState {
        store: Arc::new(ResourceConfigurationStore::new()),
        orchestrator,
    };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_address()).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
