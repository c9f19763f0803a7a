//! drive_upload CLI - Upload files to a Google Drive folder from CI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use drive_upload::{
    extract_id, sync, Authenticator, DriveClient, RetryPolicy, SkipPatterns, SyncOptions,
};

/// Upload files to Google Drive, optionally preserving folder structure,
/// processing multiple input folders and skipping files.
#[derive(Parser, Debug)]
#[command(name = "drive_upload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Paths to one or more folders to be uploaded.
    #[arg(short, long, num_args = 1.., required = true)]
    input: Vec<PathBuf>,

    /// Glob pattern to filter files in the input folders.
    #[arg(short, long, default_value = "*")]
    filter: String,

    /// Path of the folder in the drive to which the files should be uploaded.
    #[arg(short, long)]
    output: PathBuf,

    /// ID or Drive URL of the drive root folder.
    #[arg(short, long)]
    target: String,

    /// Base64 encoded credentials.json or a path to a credentials file.
    #[arg(short, long, env = "GOOGLE_APPLICATION_CREDENTIALS", hide_env_values = true)]
    credentials: String,

    /// Delete stale files (files which aren't present locally) in the output folder.
    #[arg(long)]
    purge_stale: bool,

    /// Upload all files directly into the output folder, flattening folder structure.
    #[arg(long)]
    flat_upload: bool,

    /// Comma-separated glob patterns of files to skip (e.g. '*.tmp,*.log').
    #[arg(long, default_value = "")]
    skip: String,

    /// How often a failed Drive request is retried.
    #[arg(long, default_value_t = RetryPolicy::DEFAULT_RETRIES)]
    retries: u32,
}

impl Cli {
    fn log_arguments(&self) {
        tracing::info!("==== Arguments ====");
        tracing::info!("    input: {:?}", self.input);
        tracing::info!("    filter: {}", self.filter);
        tracing::info!("    output: {}", self.output.display());
        tracing::info!("    target: {}", self.target);
        tracing::info!("    credentials: <redacted>");
        tracing::info!("    purge_stale: {}", self.purge_stale);
        tracing::info!("    flat_upload: {}", self.flat_upload);
        tracing::info!("    skip: {}", self.skip);
        tracing::info!("    retries: {}", self.retries);
    }

    fn sync_options(&self) -> Result<SyncOptions> {
        let target_id = extract_id(&self.target)
            .with_context(|| format!("Invalid target folder URL or ID: {}", self.target))?;
        let skip = SkipPatterns::parse(&self.skip)
            .with_context(|| format!("Invalid skip patterns: {}", self.skip))?;

        Ok(SyncOptions {
            inputs: self.input.clone(),
            filter: self.filter.clone(),
            output: self.output.clone(),
            target_id,
            flat_upload: self.flat_upload,
            purge_stale: self.purge_stale,
            skip,
        })
    }
}

async fn run(cli: Cli) -> Result<()> {
    cli.log_arguments();
    let options = cli.sync_options()?;

    let auth = Authenticator::from_arg(&cli.credentials).context("Failed to load credentials")?;
    let client = DriveClient::new(auth).with_retry_policy(RetryPolicy::new(cli.retries));

    sync::run(&client, &options)
        .await
        .context("Upload to Google Drive failed")?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // GitHub Actions workflow command, picked up as an annotation.
            println!("::error {:#}", e);
            ExitCode::FAILURE
        }
    }
}
