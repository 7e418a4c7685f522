//! Command-line interface for voicedrop.
//!
//! Provides commands for queueing recordings, running delivery passes,
//! inspecting the queue, and purging exhausted items.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::adapters::{HttpUploader, LogInvalidator, Uploader};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    ConnectivityProbe, PassReport, QueueState, SkipReason, SubmitOutcome, Trigger, TriggerLoop,
    UploadQueue,
};
use crate::core::state::summarize;
use crate::domain::{Artifact, QueuedUpload, UploadStatus, MAX_RETRIES};
use crate::store::{self, OwnerLock};

/// voicedrop - Offline-tolerant upload queue for voice notes
#[derive(Parser, Debug)]
#[command(name = "voicedrop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bearer token for the upload endpoint
    #[arg(long, global = true, env = "VOICEDROP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show queue status
    Status,

    /// List queued uploads in delivery order
    List {
        /// Filter by status (pending, uploading, failed)
        #[arg(short, long)]
        status: Option<UploadStatus>,

        /// Maximum number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Queue a recording for a later pass
    Enqueue {
        #[command(flatten)]
        recording: RecordingArgs,
    },

    /// Upload a recording now, queueing it if the network is down
    Submit {
        #[command(flatten)]
        recording: RecordingArgs,
    },

    /// Run one delivery pass
    Process,

    /// Keep delivering as connectivity comes and goes (Ctrl+C to stop)
    Run,

    /// Remove items that used up their retries
    ClearExhausted,

    /// Show resolved configuration
    Config,
}

/// A recording on the command line
#[derive(clap::Args, Debug)]
pub struct RecordingArgs {
    /// Path to the audio file
    pub path: PathBuf,

    /// Recording length in seconds
    #[arg(short, long)]
    pub duration: f64,

    /// When it was recorded (RFC 3339, defaults to now)
    #[arg(long)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl RecordingArgs {
    fn into_artifact(self) -> Artifact {
        Artifact::new(self.path, self.duration, self.recorded_at.unwrap_or_else(Utc::now))
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = config::config()?;

        match self.command {
            Commands::Status => show_status(config),
            Commands::List { status, limit } => list_items(config, status, limit),
            Commands::Enqueue { recording } => enqueue(config, recording),
            Commands::Submit { recording } => submit(config, self.token, recording).await,
            Commands::Process => process(config, self.token).await,
            Commands::Run => run(config, self.token).await,
            Commands::ClearExhausted => clear_exhausted(config),
            Commands::Config => show_config(config),
        }
    }
}

/// Read the queue without recovering or saving it.
///
/// Read-only commands must not rewrite state another process may be using.
fn peek_queue(config: &ResolvedConfig) -> Result<Vec<QueuedUpload>> {
    let store = store::open_store(config)?;
    Ok(store::load_queue(store.as_ref()))
}

/// Take ownership of the queue for the rest of the command.
///
/// Commands that hold the queue in memory rewrite the whole slot on save, so
/// they refuse to start while another process (usually `run`) owns it.
fn claim_queue(config: &ResolvedConfig) -> Result<OwnerLock> {
    OwnerLock::try_acquire(&config.owner_lock_path())
        .context("Failed to lock the queue")?
        .with_context(|| {
            format!(
                "Queue in {} is in use by another voicedrop process (is `voicedrop run` active?)",
                config.home.display()
            )
        })
}

fn open_state(config: &ResolvedConfig) -> Result<QueueState> {
    Ok(QueueState::rehydrate(store::open_store(config)?))
}

fn open_queue(config: &ResolvedConfig, token: Option<String>) -> Result<(Arc<UploadQueue>, Arc<dyn Uploader>)> {
    let uploader: Arc<dyn Uploader> = Arc::new(HttpUploader::from_settings(&config.uploader, token)?);
    let queue = UploadQueue::open(store::open_store(config)?, uploader.clone(), Arc::new(LogInvalidator))
        .with_min_pass_interval(config.processing.min_pass_interval());
    Ok((Arc::new(queue), uploader))
}

fn status_tag(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Pending => "PEND",
        UploadStatus::Uploading => "UPLD",
        UploadStatus::Failed => "FAIL",
    }
}

fn print_item(item: &QueuedUpload) {
    let exhausted = if item.is_exhausted() { " exhausted" } else { "" };
    println!(
        "  [{}] {} {:<30} {:>7.1}s  retries {}/{}{}",
        status_tag(item.status),
        item.id.short(),
        item.file_name(),
        item.duration_seconds,
        item.retry_count,
        MAX_RETRIES,
        exhausted
    );
    if let Some(error) = &item.last_error {
        println!("         last error: {}", error);
    }
}

/// Show queue status
fn show_status(config: &ResolvedConfig) -> Result<()> {
    let items = peek_queue(config)?;
    let summary = summarize(&items);

    println!();
    println!("Upload Queue Status");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("Queue:       {}", config.queue_path().display());
    println!();
    println!("  Pending:    {}", summary.pending);
    println!("  Uploading:  {}", summary.uploading);
    println!("  Failed:     {}", summary.failed);
    println!("  Exhausted:  {}", summary.exhausted);
    println!("  Total:      {}", summary.total());
    println!();

    if !summary.recent.is_empty() {
        println!("Next up:");
        for item in &summary.recent {
            print_item(item);
        }
        println!();
    }

    if summary.exhausted > 0 {
        println!("⚠️  {} item(s) used up their retries. Inspect them with `voicedrop list --status failed`", summary.exhausted);
        println!("    and remove them with `voicedrop clear-exhausted`.");
    }

    Ok(())
}

/// List queued items
fn list_items(config: &ResolvedConfig, status: Option<UploadStatus>, limit: usize) -> Result<()> {
    let items: Vec<QueuedUpload> = peek_queue(config)?
        .into_iter()
        .filter(|item| status.map_or(true, |s| item.status == s))
        .collect();

    if items.is_empty() {
        println!("No queued uploads");
        return Ok(());
    }

    for item in items.iter().take(limit) {
        print_item(item);
    }

    if items.len() > limit {
        println!();
        println!("... and {} more", items.len() - limit);
    }

    Ok(())
}

/// Queue a recording
fn enqueue(config: &ResolvedConfig, recording: RecordingArgs) -> Result<()> {
    if !recording.path.exists() {
        anyhow::bail!("Recording not found: {}", recording.path.display());
    }

    let _owner = claim_queue(config)?;
    let state = open_state(config)?;
    let id = state
        .enqueue(recording.into_artifact())
        .context("Failed to queue recording")?;

    println!("📥 Queued {} ({} item(s) waiting)", id.short(), state.len());
    Ok(())
}

/// Upload now, or queue when offline
async fn submit(config: &ResolvedConfig, token: Option<String>, recording: RecordingArgs) -> Result<()> {
    let _owner = claim_queue(config)?;
    let (queue, _) = open_queue(config, token)?;

    match queue.submit(recording.into_artifact()).await? {
        SubmitOutcome::Delivered(record) => println!("✅ Uploaded (remote id: {})", record.id),
        SubmitOutcome::Queued(id) => println!("📥 Offline, queued {} for later", id.short()),
    }

    Ok(())
}

fn print_report(report: &PassReport) {
    match report {
        PassReport::Skipped(SkipReason::NothingEligible) => println!("✓ Nothing to upload"),
        PassReport::Skipped(SkipReason::AlreadyRunning) => println!("ℹ️  A pass is already running"),
        PassReport::Skipped(SkipReason::Throttled) => println!("ℹ️  Pass throttled, try again shortly"),
        PassReport::Ran(stats) => {
            println!(
                "📤 Attempted {}, delivered {}, failed {}",
                stats.attempted, stats.delivered, stats.failed
            );
            if let Some(class) = stats.halted_by {
                println!("⛔ Stopped early: {:?}", class);
            }
        }
    }
}

/// Run a single pass
async fn process(config: &ResolvedConfig, token: Option<String>) -> Result<()> {
    let _owner = claim_queue(config)?;
    let (queue, _) = open_queue(config, token)?;
    let report = queue.process_queue().await;
    print_report(&report);
    Ok(())
}

/// Run the trigger loop and connectivity probe until Ctrl+C
async fn run(config: &ResolvedConfig, token: Option<String>) -> Result<()> {
    let _owner = claim_queue(config)?;
    let (queue, uploader) = open_queue(config, token)?;

    let (triggers, loop_handle) = TriggerLoop::spawn(queue.clone());
    let probe = ConnectivityProbe::new(uploader, config.processing.probe_interval())
        .spawn(triggers.clone());

    println!("👁️  Delivering queued uploads");
    println!("    Press Ctrl+C to stop");
    println!();

    triggers.fire(Trigger::Manual);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!();
    println!("🛑 Stopping...");
    probe.stop().await?;
    loop_handle.stop().await?;

    let summary = queue.summary();
    println!("   {} item(s) still queued", summary.total());

    Ok(())
}

/// Purge exhausted items
fn clear_exhausted(config: &ResolvedConfig) -> Result<()> {
    let _owner = claim_queue(config)?;
    let state = open_state(config)?;
    let removed = state.clear_exhausted().context("Failed to clear exhausted uploads")?;

    if removed > 0 {
        println!("🗑️  Removed {} exhausted item(s)", removed);
    } else {
        println!("✓ No exhausted items");
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!();
    println!("Resolved Configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    match &config.config_file {
        Some(path) => println!("Config file:        {}", path.display()),
        None => println!("Config file:        (none, using defaults)"),
    }
    println!("Home:               {}", config.home.display());
    println!("Store backend:      {:?}", config.store.backend);
    println!("Store slot:         {}", config.store.slot);
    println!("Queue location:     {}", config.queue_path().display());
    println!(
        "Upload endpoint:    {}",
        config.uploader.endpoint.as_deref().unwrap_or("(not set)")
    );
    println!("Upload timeout:     {}s", config.uploader.timeout_seconds);
    println!("Min pass interval:  {}ms", config.processing.min_pass_interval_ms);
    println!("Probe interval:     {}s", config.processing.probe_interval_seconds);
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProcessingSettings, StoreSettings, UploaderSettings};
    use tempfile::TempDir;

    fn test_config(home: &std::path::Path) -> ResolvedConfig {
        ResolvedConfig {
            home: home.to_path_buf(),
            config_file: None,
            store: StoreSettings::default(),
            uploader: UploaderSettings::default(),
            processing: ProcessingSettings::default(),
        }
    }

    fn recording(dir: &std::path::Path, name: &str) -> RecordingArgs {
        let path = dir.join(name);
        std::fs::write(&path, b"audio").unwrap();
        RecordingArgs {
            path,
            duration: 4.0,
            recorded_at: None,
        }
    }

    #[test]
    fn test_enqueue_refused_while_queue_is_owned() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());

        // A long-running owner with its own in-memory copy
        let owner = claim_queue(&config).unwrap();
        let daemon = open_state(&config).unwrap();
        let a = daemon
            .enqueue(Artifact::new(temp.path().join("a.m4a"), 1.0, Utc::now()))
            .unwrap();

        let err = enqueue(&config, recording(temp.path(), "b.m4a")).unwrap_err();
        assert!(err.to_string().contains("in use by another voicedrop process"));
        assert!(clear_exhausted(&config).is_err());

        // The owner's next save has nothing to overwrite
        daemon
            .update_status(&a, UploadStatus::Failed, Some("500".to_string()))
            .unwrap();
        let on_disk = peek_queue(&config).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].id, a);

        // Once released, the command goes through and sees the owner's items
        drop(daemon);
        drop(owner);
        enqueue(&config, recording(temp.path(), "b.m4a")).unwrap();
        assert_eq!(peek_queue(&config).unwrap().len(), 2);
    }
}
