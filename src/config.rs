use crate::services::blob_store::MAX_SIGNED_URL_TTL;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::{env, fmt, path::PathBuf, time::Duration};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_CACHE_FILE: &str = "./data/client/cache.json";

/// Which storage backend serves the handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// AWS S3 or an S3-compatible endpoint.
    S3,
    /// Objects on local disk, metadata in SQLite, self-verified signed URLs.
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(BackendKind::S3),
            "local" => Ok(BackendKind::Local),
            other => bail!("unknown storage backend `{}` (expected `s3` or `local`)", other),
        }
    }
}

/// A string that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(pub String);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Centralized server configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Target bucket. Left unset here so the handlers can report a
    /// `ConfigurationError` per request.
    pub bucket: Option<String>,
    pub region: String,
    pub backend: BackendKind,
    pub s3_endpoint: Option<String>,
    pub signed_url_ttl: Duration,
    /// `*` or an explicit list of origins.
    pub cors_origins: Vec<String>,
    pub storage_dir: String,
    pub database_url: String,
    /// Origin used in local-backend signed URLs; defaults to `http://{addr}`.
    pub public_url: Option<String>,
    pub signing_secret: Option<Secret>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Presigned-URL file upload gateway")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Host to bind to (overrides UPLOAD_GATEWAY_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_GATEWAY_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Target bucket (overrides BUCKET_NAME)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Region hint (overrides AWS_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Storage backend (overrides STORAGE_BACKEND)
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Custom S3 endpoint (overrides S3_ENDPOINT_URL)
    #[arg(long, global = true)]
    pub s3_endpoint: Option<String>,

    /// Directory for local-backend objects (overrides UPLOAD_GATEWAY_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// SQLite URL for local-backend metadata (overrides UPLOAD_GATEWAY_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create the local-backend schema and exit
    Migrate,
    /// Upload a file through the API
    Upload {
        file: PathBuf,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// List uploaded files
    List {
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ClientArgs {
    /// API base URL (overrides UPLOAD_GATEWAY_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Where the response cache is persisted between runs
    #[arg(long)]
    pub cache_file: Option<PathBuf>,
}

impl ClientArgs {
    pub fn resolved_api_url(&self) -> String {
        self.api_url
            .clone()
            .or_else(|| env::var("UPLOAD_GATEWAY_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.into())
    }

    pub fn resolved_cache_file(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE))
    }
}

impl AppConfig {
    /// Parse CLI args, then merge them over the process environment.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        let command = args.command.clone().unwrap_or(Command::Serve);
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, command))
    }

    /// Merge `args` over variables read through `var`. CLI wins.
    pub fn from_sources(args: Args, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match args.port {
            Some(port) => port,
            None => match var("UPLOAD_GATEWAY_PORT") {
                Some(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("parsing UPLOAD_GATEWAY_PORT value `{}`", value))?,
                None => 3000,
            },
        };

        let backend = match args.backend {
            Some(backend) => backend,
            None => match var("STORAGE_BACKEND") {
                Some(value) => value.parse().context("reading STORAGE_BACKEND")?,
                None => BackendKind::S3,
            },
        };

        let ttl_secs = match var("SIGNED_URL_TTL_SECS") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing SIGNED_URL_TTL_SECS value `{}`", value))?,
            None => 3600,
        };
        if !(1..=MAX_SIGNED_URL_TTL.as_secs()).contains(&ttl_secs) {
            bail!(
                "SIGNED_URL_TTL_SECS must be between 1 and {} seconds, got {}",
                MAX_SIGNED_URL_TTL.as_secs(),
                ttl_secs
            );
        }

        let cors_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".into()]);

        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: args
                .host
                .or_else(|| var("UPLOAD_GATEWAY_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port,
            bucket: non_empty(args.bucket.or_else(|| var("BUCKET_NAME"))),
            region: non_empty(args.region.or_else(|| var("AWS_REGION")))
                .unwrap_or_else(|| DEFAULT_REGION.into()),
            backend,
            s3_endpoint: non_empty(args.s3_endpoint.or_else(|| var("S3_ENDPOINT_URL"))),
            signed_url_ttl: Duration::from_secs(ttl_secs),
            cors_origins,
            storage_dir: args
                .storage_dir
                .or_else(|| var("UPLOAD_GATEWAY_STORAGE_DIR"))
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .or_else(|| var("UPLOAD_GATEWAY_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/uploads.db?mode=rwc".into()),
            public_url: non_empty(var("UPLOAD_GATEWAY_PUBLIC_URL")),
            signing_secret: non_empty(var("UPLOAD_GATEWAY_SIGNING_SECRET")).map(Secret),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
