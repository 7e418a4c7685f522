//! Event-driven scheduling of processing passes.
//!
//! Hosts send `Trigger`s (connectivity restored, app foregrounded, ...) to a
//! `TriggerLoop`, which runs one pass per burst of triggers. A pass refused by
//! the throttle is retried once the interval has elapsed. A
//! `ConnectivityProbe` can watch the upload endpoint and fire
//! `ConnectivityRestored` when it comes back.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::processor::{PassReport, SkipReason};
use super::queue::UploadQueue;
use crate::adapters::Uploader;
use crate::domain::FailureKind;

/// Events that warrant a processing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ConnectivityRestored,
    Foregrounded,
    Manual,
}

/// Sending side of a trigger loop
#[derive(Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<Trigger>,
}

impl TriggerSender {
    /// Request a pass. Never blocks: if triggers are already waiting, one
    /// more changes nothing.
    pub fn fire(&self, trigger: Trigger) {
        if let Err(e) = self.tx.try_send(trigger) {
            debug!(?trigger, error = %e, "Trigger dropped");
        }
    }
}

/// Handle to stop a background task
pub struct TaskHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Stop the task and wait for it to finish
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

/// Runs a pass for each burst of triggers
pub struct TriggerLoop;

impl TriggerLoop {
    /// Spawn the loop on the current runtime
    pub fn spawn(queue: Arc<UploadQueue>) -> (TriggerSender, TaskHandle) {
        let (tx, rx) = mpsc::channel::<Trigger>(32);
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(run_trigger_loop(queue, rx, stop_rx));

        (TriggerSender { tx }, TaskHandle { stop_tx, task })
    }
}

async fn run_trigger_loop(
    queue: Arc<UploadQueue>,
    mut rx: mpsc::Receiver<Trigger>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    // Set while a throttled pass is waiting for its interval
    let mut retry_at: Option<Instant> = None;

    loop {
        tokio::select! {
            Some(trigger) = rx.recv() => {
                // Coalesce everything that piled up into one pass
                let mut coalesced = 0;
                while rx.try_recv().is_ok() {
                    coalesced += 1;
                }

                debug!(?trigger, coalesced, "Processing trigger");
                retry_at = run_pass(&queue).await;
            }
            _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                debug!("Retrying throttled pass");
                retry_at = run_pass(&queue).await;
            }
            _ = stop_rx.recv() => {
                info!("Trigger loop stopping");
                break;
            }
            else => break,
        }
    }
}

/// Run a pass; returns when to try again if the throttle refused it
async fn run_pass(queue: &UploadQueue) -> Option<Instant> {
    let report = queue.process_queue().await;
    debug!(?report, "Triggered pass done");

    match report {
        PassReport::Skipped(SkipReason::Throttled) => {
            Some(Instant::now() + queue.throttle_remaining())
        }
        _ => None,
    }
}

/// Periodically checks the remote store and fires `ConnectivityRestored`
pub struct ConnectivityProbe {
    uploader: Arc<dyn Uploader>,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(uploader: Arc<dyn Uploader>, interval: Duration) -> Self {
        Self { uploader, interval }
    }

    /// Spawn the probe on the current runtime
    pub fn spawn(self, triggers: TriggerSender) -> TaskHandle {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            let mut online: Option<bool> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Only an unreachable server counts as offline; an auth
                        // error still proves the network works
                        let now_online = !matches!(
                            self.uploader.health_check().await,
                            Err(ref failure) if failure.kind == FailureKind::Unreachable
                        );

                        if came_online(online, now_online) {
                            info!("Connectivity restored");
                            triggers.fire(Trigger::ConnectivityRestored);
                        } else if online != Some(now_online) {
                            info!("Connectivity lost");
                        }
                        online = Some(now_online);
                    }
                    _ = stop_rx.recv() => {
                        debug!("Connectivity probe stopping");
                        break;
                    }
                }
            }
        });

        TaskHandle { stop_tx, task }
    }
}

/// Whether a probe result is an offline (or unknown) to online transition
fn came_online(previous: Option<bool>, now: bool) -> bool {
    now && previous != Some(true)
}
