use anyhow::{Context, Result};
use axum::Router;
use config::{AppConfig, BackendKind, ClientArgs, Command};
use services::{
    blob_store::BlobStore, s3_store::S3Store, storage_service::StorageService,
    url_signer::UrlSigner,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use state::{ApiSettings, AppState};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;

mod client;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod worker;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("upload_gateway=info,tower_http=info")),
        )
        .init();

    let (cfg, command) = AppConfig::from_env_and_args()?;

    match command {
        Command::Serve => serve(cfg).await,
        Command::Migrate => {
            let db = connect_metadata_db(&cfg.database_url).await?;
            StorageService::run_migrations(&db).await?;
            tracing::info!("Database migration complete.");
            Ok(())
        }
        Command::Upload { file, client } => upload(&file, &client).await,
        Command::List { client } => list(&client).await,
    }
}

async fn serve(cfg: AppConfig) -> Result<()> {
    tracing::info!("Starting upload-gateway with config: {:?}", cfg);

    let addr = cfg.addr();
    let listener = bind(&addr, &cfg).await?;
    let local_addr = listener.local_addr()?;

    if cfg.bucket.is_none() {
        tracing::warn!("BUCKET_NAME is not set; API requests will fail until it is configured");
    }

    let (store, objects): (Arc<dyn BlobStore>, Option<StorageService>) = match cfg.backend {
        BackendKind::S3 => {
            let store = S3Store::new(cfg.region.clone(), cfg.s3_endpoint.clone()).await;
            (Arc::new(store), None)
        }
        BackendKind::Local => {
            let public_url = cfg
                .public_url
                .clone()
                .unwrap_or_else(|| format!("http://{}", local_addr));
            let service = local_backend(&cfg, &public_url).await?;
            (Arc::new(service.clone()), Some(service))
        }
    };
    tracing::info!(backend = store.backend_name(), "Storage backend ready");

    let state = AppState::new(
        store,
        ApiSettings {
            bucket: cfg.bucket.clone(),
            signed_url_ttl: cfg.signed_url_ttl,
        },
    );
    let app: Router = routes::routes::routes(state, objects, &cfg.cors_origins);

    tracing::info!("Server listening on http://{}", local_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn bind(addr: &str, cfg: &AppConfig) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            Ok(TcpListener::bind(&fallback_addr).await?)
        }
        Err(err) => Err(err).with_context(|| format!("binding {}", addr)),
    }
}

/// Disk + SQLite backend with self-verified signed URLs.
async fn local_backend(cfg: &AppConfig, public_url: &str) -> Result<StorageService> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir).await?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db = connect_metadata_db(&cfg.database_url).await?;
    StorageService::run_migrations(&db).await?;

    let signer = match &cfg.signing_secret {
        Some(secret) => UrlSigner::new(&secret.0),
        None => {
            tracing::warn!(
                "UPLOAD_GATEWAY_SIGNING_SECRET is not set; signed URLs will not survive a restart"
            );
            UrlSigner::new(uuid::Uuid::new_v4().as_bytes())
        }
    };

    let service = StorageService::new(Arc::new(db), &cfg.storage_dir, public_url, signer);
    if let Some(bucket) = cfg.bucket.as_deref() {
        service.ensure_bucket(bucket, &cfg.region).await?;
    }
    Ok(service)
}

async fn connect_metadata_db(db_url: &str) -> Result<SqlitePool> {
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:")
        .split('?')
        .next()
        .unwrap_or_default();
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("connecting to {}", db_url))
}

async fn open_client(args: &ClientArgs) -> Result<(client::upload_client::UploadClient, PathBuf)> {
    let api_url = args.resolved_api_url();
    let cache_file = args.resolved_cache_file();
    let storage = worker::cache::CacheStorage::load(&cache_file)
        .await
        .with_context(|| format!("loading cache from {}", cache_file.display()))?;

    let http = reqwest::Client::new();
    let worker = worker::cache_worker::CacheWorker::new(
        client::upload_client::UploadClient::worker_config(&api_url),
        storage,
        Arc::new(worker::fetcher::HttpFetcher::new(http.clone())),
    );
    worker.install().await?;
    let entries = worker.storage().len(worker.cache_name()).await;
    tracing::debug!(cache = worker.cache_name(), entries, "Cache worker ready");
    for name in worker.activate().await {
        tracing::info!(cache = %name, "Evicted old cache");
    }

    Ok((
        client::upload_client::UploadClient::new(http, &api_url, worker),
        cache_file,
    ))
}

async fn upload(file: &Path, args: &ClientArgs) -> Result<()> {
    let (client, cache_file) = open_client(args).await?;
    let outcome = client.upload(file).await?;
    client
        .worker()
        .storage()
        .save(&cache_file)
        .await
        .with_context(|| format!("saving cache to {}", cache_file.display()))?;
    println!(
        "Uploaded {} ({}, {} bytes)",
        outcome.key, outcome.content_type, outcome.size
    );
    Ok(())
}

async fn list(args: &ClientArgs) -> Result<()> {
    let (client, cache_file) = open_client(args).await?;
    let listing = client.list_files().await?;

    client
        .worker()
        .storage()
        .save(&cache_file)
        .await
        .with_context(|| format!("saving cache to {}", cache_file.display()))?;

    if listing.is_stale() {
        println!("(offline: showing a cached listing)");
    }
    if listing.files.is_empty() {
        println!("No files uploaded yet.");
    }
    for file in &listing.files {
        match (&file.url, &file.error) {
            (Some(url), _) => println!(
                "{}\t{} bytes\t{}\t{}",
                file.name,
                file.size,
                file.last_modified.to_rfc3339(),
                url
            ),
            (None, error) => println!(
                "{}\t{} bytes\t{}\t<{}>",
                file.name,
                file.size,
                file.last_modified.to_rfc3339(),
                error.as_deref().unwrap_or("no URL")
            ),
        }
    }
    Ok(())
}
