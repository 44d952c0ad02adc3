//! reportsync CLI - Command line interface for report exports.
//!
//! This tool uploads files and syncs report bundles into Google Drive and
//! Google Sheets, and can render a bundle as CSV without touching the network.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use reportsync_common::Credentials;
use reportsync_report::{CoverInfo, ReportBundle};
use reportsync_storage::{create_google_workspace, ConsentFlow, LoopbackConsent};
use reportsync_sync::{ArtifactStatus, ExportConfig, ExportEngine, ExportReport, FileArtifact};

#[derive(Parser)]
#[command(name = "reportsync")]
#[command(about = "reportsync - Export reports to Google Drive and Sheets")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Credentials file (defaults to the user config dir, then the environment).
    #[arg(short, long, global = true, env = "REPORTSYNC_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Per-operation timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files, replacing any existing file with the same name.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Remote name (single file only; defaults to the file name).
        #[arg(short, long)]
        name: Option<String>,

        /// Content type sent with every file.
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Download a URL and upload it under a name.
    UploadUrl {
        /// Source URL.
        url: String,

        /// Remote name.
        #[arg(short, long)]
        name: String,

        /// Content type.
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Sync a report bundle (JSON) into a spreadsheet.
    SyncReport {
        /// Report bundle file.
        bundle: PathBuf,

        /// Spreadsheet name.
        #[arg(short, long)]
        name: String,

        /// Print the sheets as CSV instead of syncing.
        #[arg(long)]
        csv: bool,
    },

    /// Revoke an access token issued by an earlier session.
    SignOut {
        /// Token to revoke.
        #[arg(long, env = "REPORTSYNC_ACCESS_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Check credentials and provider readiness.
    Status {
        /// Also run the consent flow and report the session.
        #[arg(long)]
        sign_in: bool,
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
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ExportConfig {
        timeout: cli.timeout.map(Duration::from_secs),
        ..ExportConfig::default()
    };
    let credentials = cli.credentials.as_deref();

    match cli.command {
        Commands::Upload {
            paths,
            name,
            content_type,
        } => cmd_upload(credentials, config, &paths, name, content_type).await,

        Commands::UploadUrl {
            url,
            name,
            content_type,
        } => cmd_upload_url(credentials, config, &url, &name, content_type).await,

        Commands::SyncReport { bundle, name, csv } => {
            if csv {
                cmd_render_csv(&bundle, &name).await
            } else {
                cmd_sync_report(credentials, config, &bundle, &name).await
            }
        }

        Commands::SignOut { token } => cmd_sign_out(credentials, token).await,

        Commands::Status { sign_in } => cmd_status(credentials, sign_in).await,
    }
}

/// Load credentials, preferring an explicit file.
fn load_credentials(path: Option<&Path>) -> Result<Credentials> {
    Credentials::load(path).context("Failed to load Google credentials")
}

fn engine(
    credentials: Option<&Path>,
    config: ExportConfig,
) -> Result<ExportEngine<reportsync_storage::GoogleWorkspace>> {
    let workspace = create_google_workspace(load_credentials(credentials)?)
        .context("Failed to set up the Google client")?;
    Ok(ExportEngine::new(workspace, config))
}

async fn read_bundle(path: &Path) -> Result<ReportBundle> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let bundle: ReportBundle = serde_json::from_str(&json).context("Invalid report bundle")?;
    if bundle.is_empty() {
        anyhow::bail!("Report bundle has no sections");
    }
    Ok(bundle)
}

/// Print one line per artifact and fail if any artifact failed.
fn print_report(report: &ExportReport) -> Result<()> {
    for entry in report.entries() {
        match entry.status {
            ArtifactStatus::Synced => {
                println!(
                    "  [OK]   {} {}",
                    entry.artifact,
                    entry.url.as_deref().unwrap_or_default()
                );
                for warning in &entry.warnings {
                    println!("         warning: {}", warning);
                }
            }
            ArtifactStatus::Failed => println!(
                "  [FAIL] {}: {}",
                entry.artifact,
                entry.error.as_deref().unwrap_or_default()
            ),
            ArtifactStatus::Skipped => println!("  [SKIP] {}", entry.artifact),
            ArtifactStatus::Pending => println!("  [----] {}", entry.artifact),
        }
    }

    let failed = report.entries().len()
        - report.entries_with_status(ArtifactStatus::Synced).len();
    if failed > 0 {
        anyhow::bail!("{} of {} artifacts were not written", failed, report.entries().len());
    }
    Ok(())
}

/// Upload local files.
async fn cmd_upload(
    credentials: Option<&Path>,
    config: ExportConfig,
    paths: &[PathBuf],
    name: Option<String>,
    content_type: Option<String>,
) -> Result<()> {
    if name.is_some() && paths.len() > 1 {
        anyhow::bail!("--name can only be used with a single file");
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let remote_name = match &name {
            Some(name) => name.clone(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .context("Path has no file name")?,
        };

        let mut file = FileArtifact::from_bytes(remote_name, content);
        if let Some(ct) = &content_type {
            file = file.with_content_type(ct.clone());
        }
        files.push(file);
    }

    info!("Uploading {} files", files.len());
    let report = engine(credentials, config)?.export_files(files).await;
    print_report(&report)
}

/// Upload the content behind a URL.
async fn cmd_upload_url(
    credentials: Option<&Path>,
    config: ExportConfig,
    url: &str,
    name: &str,
    content_type: Option<String>,
) -> Result<()> {
    let mut file = FileArtifact::from_url(name, url);
    if let Some(ct) = content_type {
        file = file.with_content_type(ct);
    }

    info!("Uploading {} as {}", url, name);
    let report = engine(credentials, config)?.export_files(vec![file]).await;
    print_report(&report)
}

/// Sync a report bundle into a spreadsheet.
async fn cmd_sync_report(
    credentials: Option<&Path>,
    config: ExportConfig,
    bundle_path: &Path,
    name: &str,
) -> Result<()> {
    let bundle = read_bundle(bundle_path).await?;
    let engine = engine(credentials, config)?;

    info!("Syncing report {} ({} sections)", name, bundle.kinds().len());
    let report = engine
        .export_report(name, &bundle, &CoverInfo::now(name))
        .await
        .context("Failed to export report")?;
    print_report(&report)
}

/// Render every sheet of a report as CSV on stdout.
async fn cmd_render_csv(bundle_path: &Path, name: &str) -> Result<()> {
    let bundle = read_bundle(bundle_path).await?;
    let sheets = ExportEngine::<reportsync_storage::GoogleWorkspace>::build_sheets(
        &bundle,
        &CoverInfo::now(name),
    )
    .context("Failed to lay out report")?;

    for (i, sheet) in sheets.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("# {}", sheet.sheet_name());
        print!("{}", sheet.to_csv());
    }
    Ok(())
}

/// Revoke a previously issued token.
async fn cmd_sign_out(credentials: Option<&Path>, token: Option<String>) -> Result<()> {
    let Some(token) = token else {
        println!("No active session.");
        return Ok(());
    };

    let credentials = load_credentials(credentials)?;
    let consent = LoopbackConsent::new(credentials.client_secret().cloned())
        .context("Failed to set up sign-in")?;
    consent
        .revoke(&token)
        .await
        .context("Failed to revoke token")?;

    println!("Signed out.");
    Ok(())
}

/// Show configuration and readiness.
async fn cmd_status(credentials: Option<&Path>, sign_in: bool) -> Result<()> {
    let credentials = load_credentials(credentials)?;

    println!("Credentials:");
    println!("  Client ID: {}", credentials.client_id());
    println!(
        "  Folder: {}",
        credentials.container_id().unwrap_or("(none, files go to My Drive)")
    );

    let workspace =
        create_google_workspace(credentials).context("Failed to set up the Google client")?;
    let bootstrapper = workspace.bootstrapper();

    let runtime = bootstrapper
        .runtime()
        .await
        .context("Failed to initialize the Google client")?;
    println!("Provider: {:?}", bootstrapper.state());
    println!("  Drive: {}", runtime.endpoints.drive_base);
    println!("  Sheets: {}", runtime.endpoints.sheets_base);

    if sign_in {
        workspace
            .auth()
            .ensure_token()
            .await
            .context("Sign-in failed")?;
        if let Some(session) = workspace.auth().session().await {
            println!("Signed in at {}", session.obtained_at());
        }
        workspace
            .auth()
            .sign_out()
            .await
            .context("Failed to sign out")?;
    } else {
        println!("Signed in: {}", workspace.auth().is_signed_in().await);
    }

    Ok(())
}
