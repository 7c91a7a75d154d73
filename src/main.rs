/*!
 * cache-mirror CLI - runs one sync cycle per invocation
 */

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cache_mirror::{
    config::{MirrorConfig, DEFAULT_ARCHIVE_URL, DEFAULT_BUCKET, DEFAULT_KEEP},
    error::{Result, EXIT_SUCCESS},
    logging, run_cycle, HttpCatalog, HttpFetcher, PublicManifestStore, S3Store, SyncOutcome,
};

#[derive(Parser)]
#[command(name = "cache-mirror")]
#[command(version, about = "Mirror the newest published game cache bundle into object storage", long_about = None)]
struct Cli {
    /// Storage account id
    #[arg(long, env = "MIRROR_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Access key id
    #[arg(long, env = "MIRROR_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    /// Secret access key
    #[arg(long, env = "MIRROR_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    /// Destination bucket
    #[arg(long, env = "MIRROR_BUCKET", default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// S3 endpoint override (derived from the account id when omitted)
    #[arg(long, env = "MIRROR_ENDPOINT")]
    endpoint: Option<String>,

    /// Public base URL of the bucket, used for manifest reads
    #[arg(long, env = "MIRROR_PUBLIC_URL")]
    public_url: Option<String>,

    /// Upstream archive base URL
    #[arg(long, default_value = DEFAULT_ARCHIVE_URL)]
    archive_url: String,

    /// Number of bundles to keep published
    #[arg(long, default_value_t = DEFAULT_KEEP)]
    keep: usize,

    /// Staging directory (defaults under the system temp dir)
    #[arg(long, value_name = "PATH")]
    staging_dir: Option<PathBuf>,

    /// Enable debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Write logs as JSON lines to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> MirrorConfig {
        let mut config = MirrorConfig {
            account_id: self.account_id.unwrap_or_default(),
            access_key_id: self.access_key_id.unwrap_or_default(),
            secret_access_key: self.secret_access_key.unwrap_or_default(),
            bucket: self.bucket,
            endpoint: self.endpoint,
            public_url: self.public_url,
            archive_url: self.archive_url,
            keep: self.keep,
            verbose: self.verbose,
            log_file: self.log_file,
            ..MirrorConfig::default()
        };
        if let Some(staging_dir) = self.staging_dir {
            config.staging_dir = staging_dir;
        }
        config
    }
}

async fn run(config: &MirrorConfig) -> Result<SyncOutcome> {
    let http = reqwest::Client::new();
    let store = Arc::new(S3Store::connect(config).await?);

    let catalog = HttpCatalog::new(config, http.clone());
    let fetcher = HttpFetcher::new(config, http.clone());
    let manifest_store = PublicManifestStore::new(config, http, store.clone());

    run_cycle(config, &catalog, &fetcher, store.as_ref(), &manifest_store).await
}

#[tokio::main]
async fn main() {
    let config = Cli::parse().into_config();

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    // Credentials are checked before any network call is made
    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }

    match run(&config).await {
        Ok(SyncOutcome::NoOp) => {
            info!("nothing to do");
            std::process::exit(EXIT_SUCCESS);
        }
        Ok(SyncOutcome::Published { name, pruned }) => {
            info!(name = %name, pruned = pruned.len(), "sync cycle complete");
            std::process::exit(EXIT_SUCCESS);
        }
        Err(e) => {
            error!("sync cycle failed: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
