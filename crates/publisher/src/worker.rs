//! Background workers driving submission and confirmation.
//!
//! Two thread-based loops: the submission worker picks up approved batches
//! whose next attempt is due, the confirmation worker polls open dispatch
//! records and runs the stale-timeout sweep.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::backend::LedgerBackend;
use crate::error::PublishError;
use crate::publish::Publisher;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub poll_interval: Duration,
    /// How often the confirmation worker runs the stale-timeout sweep,
    /// measured in poll cycles.
    pub sweep_every: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "ledgerseal-worker".to_string(),
            poll_interval: Duration::from_secs(5),
            sweep_every: 60,
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub cycles: u64,
    pub submissions_attempted: u64,
    pub submissions_accepted: u64,
    pub confirmations_settled: u64,
    pub late_confirmations_resolved: u64,
    pub errors: u64,
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Spawn the submission worker.
///
/// Each cycle it asks the publisher for approved batches whose attempt is
/// due and publishes them one at a time. Bounce-and-retry state lives on the
/// batch, so a crashed worker loses nothing.
pub fn spawn_submission_worker<B>(
    publisher: Arc<Publisher<B>>,
    config: WorkerConfig,
) -> WorkerHandle
where
    B: LedgerBackend + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let stats = Arc::new(Mutex::new(WorkerStats::default()));
    let stats_clone = stats.clone();

    let name = config.name.clone();
    let join = thread::Builder::new()
        .name(name)
        .spawn(move || submission_loop(publisher, config, shutdown_rx, stats_clone))
        .expect("failed to spawn submission worker thread");

    WorkerHandle {
        shutdown: shutdown_tx,
        join: Some(join),
        stats,
    }
}

/// Spawn the confirmation worker.
///
/// Each cycle it polls due dispatch records; every `sweep_every` cycles it
/// also re-queries timed-out dispatches for late confirmations.
pub fn spawn_confirmation_worker<B>(
    publisher: Arc<Publisher<B>>,
    config: WorkerConfig,
) -> WorkerHandle
where
    B: LedgerBackend + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let stats = Arc::new(Mutex::new(WorkerStats::default()));
    let stats_clone = stats.clone();

    let name = config.name.clone();
    let join = thread::Builder::new()
        .name(name)
        .spawn(move || confirmation_loop(publisher, config, shutdown_rx, stats_clone))
        .expect("failed to spawn confirmation worker thread");

    WorkerHandle {
        shutdown: shutdown_tx,
        join: Some(join),
        stats,
    }
}

fn submission_loop<B: LedgerBackend>(
    publisher: Arc<Publisher<B>>,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, "submission worker started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        {
            let mut s = stats.lock().unwrap();
            s.cycles += 1;
        }

        match publisher.due_for_submission() {
            Ok(due) => {
                for batch_id in due {
                    {
                        let mut s = stats.lock().unwrap();
                        s.submissions_attempted += 1;
                    }
                    match publisher.publish(batch_id) {
                        Ok(submission_id) => {
                            debug!(
                                worker = %config.name,
                                batch_id = %batch_id,
                                submission_id = %submission_id,
                                "batch submitted"
                            );
                            stats.lock().unwrap().submissions_accepted += 1;
                        }
                        // Another caller got there first; not a failure.
                        Err(PublishError::PublishInProgress { .. }) => {}
                        Err(e) => {
                            debug!(
                                worker = %config.name,
                                batch_id = %batch_id,
                                error = %e,
                                "submission attempt failed"
                            );
                            stats.lock().unwrap().errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!(worker = %config.name, error = %e, "failed to list due batches");
                stats.lock().unwrap().errors += 1;
            }
        }

        thread::sleep(config.poll_interval);
    }

    info!(worker = %config.name, "submission worker stopped");
}

fn confirmation_loop<B: LedgerBackend>(
    publisher: Arc<Publisher<B>>,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, "confirmation worker started");
    let mut cycle: u32 = 0;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        cycle = cycle.wrapping_add(1);
        {
            let mut s = stats.lock().unwrap();
            s.cycles += 1;
        }

        match publisher.poll_due_confirmations() {
            Ok(settled) => {
                if !settled.is_empty() {
                    stats.lock().unwrap().confirmations_settled += settled.len() as u64;
                }
            }
            Err(e) => {
                error!(worker = %config.name, error = %e, "confirmation poll pass failed");
                stats.lock().unwrap().errors += 1;
            }
        }

        if config.sweep_every > 0 && cycle % config.sweep_every == 0 {
            match publisher.sweep_stale_timeouts() {
                Ok(resolved) => {
                    if resolved > 0 {
                        stats.lock().unwrap().late_confirmations_resolved += resolved as u64;
                    }
                }
                Err(e) => {
                    error!(worker = %config.name, error = %e, "stale-timeout sweep failed");
                    stats.lock().unwrap().errors += 1;
                }
            }
        }

        thread::sleep(config.poll_interval);
    }

    info!(worker = %config.name, "confirmation worker stopped");
}
