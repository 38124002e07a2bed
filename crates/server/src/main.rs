use std::sync::Arc;
use std::time::Duration;

use grouping::TagClassifier;
use parking_lot::RwLock;
use regenre_server::auth::ApiTokens;
use regenre_server::build_router;
use regenre_server::catalog::{Catalog, HttpCatalog, LocalCatalog};
use regenre_server::config::{
    config_path_from_env, load_or_create_config, resolve_path, CatalogKind,
};
use regenre_server::state::AppState;
use regenre_server::storage::StorageHandle;
use regenre_server::sync::GroupingService;
use reqwest::Client;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let catalog: Arc<dyn Catalog> = match config.catalog.kind {
        CatalogKind::Local => {
            let path = resolve_path(&config_path, &config.catalog.playlists_path);
            Arc::new(LocalCatalog::load(&path)?)
        }
        CatalogKind::Http => {
            let client = Client::builder().user_agent("regenre/0.1").build()?;
            let token = Some(config.catalog.token.clone());
            info!("Using catalog at {}", config.catalog.base_url);
            Arc::new(HttpCatalog::new(
                client,
                &config.catalog.base_url,
                token,
                Duration::from_secs(config.catalog.timeout_secs),
            ))
        }
    };
    let classifier = Arc::new(TagClassifier::with_aliases(&config.genre_aliases));
    let storage = StorageHandle::redb(resolve_path(&config_path, &config.groupings_path));

    let auth = ApiTokens::new(&config.api_tokens);
    if !auth.is_configured() {
        warn!("No api_tokens configured; grouping routes will answer 503 until one is added.");
    }

    let bind_addr = config.bind_addr();
    let state = AppState {
        config_path,
        config: Arc::new(RwLock::new(config)),
        auth,
        sync: GroupingService::new(storage, catalog, classifier),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
