use report_feed::{
    router, ui::HtmlPresenter, AppState, Backend, Config, DuplicateGuard, MemoryTable,
    RemoteTable, RestTable, Submitter, SyncEngine,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env()?;

    let remote: Arc<dyn RemoteTable> = match &config.backend {
        Backend::Local { data_path } => {
            info!("using local table at {}", data_path.display());
            Arc::new(MemoryTable::open(config.sync.table.clone(), data_path).await)
        }
        Backend::Rest { base_url, api_key } => {
            info!("using remote table `{}` at {base_url}", config.sync.table);
            Arc::new(RestTable::new(base_url, &config.sync.table, api_key.clone())?)
        }
    };

    let engine = SyncEngine::start(Arc::clone(&remote), config.sync.clone());
    let sync = engine.handle();

    let presenter = Arc::new(HtmlPresenter::new());
    let presenting = sync.attach(Arc::clone(&presenter));

    let guard = DuplicateGuard::new(Arc::clone(&remote), config.recency_window_secs);
    let submitter = Submitter::new(remote, guard).with_sync(sync.clone());
    let app = router(AppState::new(sync, submitter, presenter));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.stop().await;
    let _ = presenting.await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
