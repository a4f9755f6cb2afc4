//! cloudbridge CLI - Command line interface for object storage.
//!
//! Initializes a cloud driver from `CLOUD_*` environment variables with
//! flags taking precedence, then runs one storage operation and prints JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cloudbridge_facade::{
    default_destination, DriverConfig, DriverManager, ObjectStorageFacade, ToolSurface,
    DEFAULT_DOWNLOAD_DIR,
};

#[derive(Parser)]
#[command(name = "cloudbridge")]
#[command(about = "cloudbridge - Provider-agnostic object storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Cloud provider: "aws", "azure", or "google" [env: CLOUD_PROVIDER].
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Access key, the storage account name for azure [env: CLOUD_ACCESS_KEY].
    #[arg(long, global = true)]
    access_key: Option<String>,

    /// Secret key [env: CLOUD_SECRET_KEY].
    #[arg(long, global = true)]
    secret_key: Option<String>,

    /// Region, default us-east-1 [env: CLOUD_REGION].
    #[arg(long, global = true)]
    region: Option<String>,

    /// Endpoint override for S3-compatible or emulated services [env: CLOUD_ENDPOINT].
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Transfer deadline in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Directory for downloads without an explicit destination.
    #[arg(long, global = true, default_value = DEFAULT_DOWNLOAD_DIR)]
    download_dir: PathBuf,

    /// Hide and refuse the delete_object tool.
    #[arg(long, global = true)]
    no_delete: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all buckets.
    Buckets,

    /// Show bucket details.
    Bucket {
        /// Bucket name.
        name: String,
    },

    /// List objects in a bucket.
    Ls {
        /// Bucket name.
        bucket: String,

        /// Only keys starting with this prefix.
        #[arg(short, long)]
        prefix: Option<String>,

        /// Group keys up to this delimiter.
        #[arg(short, long)]
        delimiter: Option<String>,
    },

    /// Show object metadata.
    Stat {
        /// Bucket name.
        bucket: String,

        /// Object key.
        key: String,
    },

    /// Download an object.
    Get {
        /// Bucket name.
        bucket: String,

        /// Object key.
        key: String,

        /// Destination file (default: <download-dir>/<key>).
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Upload a local file.
    Put {
        /// Bucket name.
        bucket: String,

        /// Object key.
        key: String,

        /// Source file.
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Delete an object.
    Rm {
        /// Bucket name.
        bucket: String,

        /// Object key.
        key: String,
    },

    /// Print the tool catalog.
    Tools,

    /// Invoke a tool with JSON arguments.
    Call {
        /// Tool name.
        tool: String,

        /// Arguments as a JSON object.
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Read an object:// or download:// resource.
    Resource {
        /// Resource URI.
        uri: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DriverConfig::from_env().overlay(DriverConfig {
        provider: cli.provider.clone(),
        access_key: cli.access_key.clone(),
        secret_key: cli.secret_key.clone(),
        region: cli.region.clone(),
        endpoint: cli.endpoint.clone(),
    });

    let driver = Arc::new(DriverManager::with_default_registry());
    driver
        .initialize(config.clone())
        .await
        .inspect_err(|e| error!("Exiting: {}", e))
        .context("Failed to initialize cloud driver")?;
    info!("Cloud driver ready");

    let mut facade = ObjectStorageFacade::new(driver);
    if let Some(secs) = cli.timeout {
        facade = facade.with_transfer_timeout(Duration::from_secs(secs));
    }

    let surface = ToolSurface::new(facade)
        .with_delete(!cli.no_delete)
        .with_download_dir(cli.download_dir.clone())
        .with_fallback_config(config);

    run(cli.command, &surface, &cli.download_dir).await
}

async fn run(command: Commands, surface: &ToolSurface, download_dir: &Path) -> Result<()> {
    let facade = surface.facade();

    match command {
        Commands::Buckets => print(&facade.list_buckets().await?),

        Commands::Bucket { name } => print(&facade.get_bucket(&name).await?),

        Commands::Ls {
            bucket,
            prefix,
            delimiter,
        } => print(
            &facade
                .list_objects(&bucket, prefix.as_deref(), delimiter.as_deref())
                .await?,
        ),

        Commands::Stat { bucket, key } => print(&facade.get_object(&bucket, &key).await?),

        Commands::Get { bucket, key, dest } => {
            let dest = match dest {
                Some(dest) => dest,
                None => default_destination(download_dir, &key)?,
            };
            print(&facade.download(&bucket, &key, &dest).await?)
        }

        Commands::Put {
            bucket,
            key,
            source,
        } => print(&facade.upload(&bucket, &key, &source).await?),

        Commands::Rm { bucket, key } => {
            let reply = surface
                .invoke(
                    "delete_object",
                    serde_json::json!({ "bucket_name": bucket, "object_name": key }),
                )
                .await;
            print_reply(&reply)
        }

        Commands::Tools => print(&surface.catalog()),

        Commands::Call { tool, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("Arguments must be valid JSON")?;
            let reply = surface.invoke(&tool, args).await;
            print_reply(&reply)
        }

        Commands::Resource { uri } => {
            let reply = surface.read_resource(&uri).await;
            print_reply(&reply)
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a tool reply; error replies also fail the process.
fn print_reply(reply: &serde_json::Value) -> Result<()> {
    print(reply)?;
    if let Some(kind) = reply.get("error").and_then(|e| e.as_str()) {
        anyhow::bail!("{} failed", kind);
    }
    Ok(())
}
