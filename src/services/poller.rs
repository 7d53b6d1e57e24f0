//! Client-side poll worker driving one operation to a terminal state
//!
//! Owns its loop state (attempt counter, stopped flag, timer cancellation)
//! and rendezvouses with the webhook path only through the persisted
//! operation record. A stopped worker never schedules another check, even
//! when a status request was in flight when `stop` was called.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use tokio::sync::Notify;

use crate::models::operation::OperationStatus;
use crate::services::backoff::BackoffPolicy;
use crate::services::provider_api::{ProviderError, StatusSource};
use crate::services::reconciler::{self, ReconcileMetadata};
use crate::services::operation_store;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Callbacks fired when a poll loop ends; `stop` has already run by the
/// time any of these is invoked
pub trait PollObserver: Send + Sync {
    /// Reconciliation applied; receives the stored record including its
    /// result payload
    fn on_complete(&self, operation: &crate::entities::operations::Model);
    fn on_error(&self, operation_id: &str, message: &str);
    /// Attempts exhausted; explicitly not an error, the provider may still
    /// complete the operation out of band
    fn on_timeout(&self, operation_id: &str);
}

/// Observer that only logs; used where nobody listens for outcomes
pub struct LogObserver;

impl PollObserver for LogObserver {
    fn on_complete(&self, operation: &crate::entities::operations::Model) {
        tracing::info!(
            "Operation {} completed polling as {}",
            operation.operation_id,
            operation.status
        );
    }

    fn on_error(&self, operation_id: &str, message: &str) {
        tracing::error!("Operation {} polling failed: {}", operation_id, message);
    }

    fn on_timeout(&self, operation_id: &str) {
        tracing::warn!(
            "Operation {} exhausted poll attempts, awaiting webhook or manual resume",
            operation_id
        );
    }
}

struct PollShared {
    attempts: AtomicU32,
    stopped: AtomicBool,
    active: AtomicBool,
    cancel: Notify,
}

impl PollShared {
    fn new(initial_attempts: u32) -> Self {
        Self {
            attempts: AtomicU32::new(initial_attempts),
            stopped: AtomicBool::new(false),
            active: AtomicBool::new(false),
            cancel: Notify::new(),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.notify_waiters();
    }
}

/// Display-only view of a running poll loop
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub active: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub progress: f64,
    pub estimated_remaining: Duration,
}

pub struct PollWorker {
    db: DatabaseConnection,
    source: Arc<dyn StatusSource>,
    observer: Arc<dyn PollObserver>,
    config: PollConfig,
    shared: Arc<PollShared>,
}

impl PollWorker {
    pub fn new(
        db: DatabaseConnection,
        source: Arc<dyn StatusSource>,
        observer: Arc<dyn PollObserver>,
        config: PollConfig,
    ) -> Self {
        Self {
            db,
            source,
            observer,
            config,
            shared: Arc::new(PollShared::new(0)),
        }
    }

    /// Begin polling a newly created operation: attempt counter reset, the
    /// record marked processing, first check after one base interval.
    ///
    /// Any loop this worker was already running is stopped first.
    pub fn start(&mut self, operation_id: &str) {
        self.spawn(operation_id, 0, false);
    }

    /// Re-attach to an in-flight operation (after a restart or a manual
    /// "check again"); first check runs immediately and the attempt counter
    /// continues from the persisted value.
    pub fn resume(&mut self, operation_id: &str, attempts: u32) {
        self.spawn(operation_id, attempts, true);
    }

    fn spawn(&mut self, operation_id: &str, initial_attempts: u32, immediate: bool) {
        self.stop();

        let shared = Arc::new(PollShared::new(initial_attempts));
        shared.active.store(true, Ordering::SeqCst);
        self.shared = shared.clone();

        let db = self.db.clone();
        let source = self.source.clone();
        let observer = self.observer.clone();
        let config = self.config.clone();
        let operation_id = operation_id.to_string();

        // The stopped flag and cancel notify own the loop lifecycle; the
        // join handle is not kept
        tokio::spawn(async move {
            run_loop(db, source, observer, config, shared, operation_id, immediate).await;
        });
    }

    /// Idempotent; safe from teardown paths and called internally before
    /// every observer callback
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PollSnapshot {
        let attempts = self.attempts();
        let max_attempts = self.config.max_attempts;
        PollSnapshot {
            active: self.is_active(),
            attempts,
            max_attempts,
            progress: f64::from(attempts) / f64::from(max_attempts.max(1)),
            estimated_remaining: self
                .config
                .backoff
                .estimated_remaining(attempts, max_attempts),
        }
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    db: DatabaseConnection,
    source: Arc<dyn StatusSource>,
    observer: Arc<dyn PollObserver>,
    config: PollConfig,
    shared: Arc<PollShared>,
    operation_id: String,
    immediate: bool,
) {
    let mut delay = if immediate {
        Duration::ZERO
    } else {
        if let Err(e) = operation_store::mark_status(
            &db,
            &operation_id,
            OperationStatus::Processing,
        )
        .await
        {
            tracing::warn!("Failed to mark {} processing: {}", operation_id, e);
        }
        config.backoff.base_interval
    };

    loop {
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shared.cancel.notified() => break,
            }
        }
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }

        let check = source.check_status(&operation_id).await;

        // A request that resolves after stop() must not schedule anything
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }

        match check {
            Err(ProviderError::NeedsReauthorization) => {
                shared.stop();
                observer.on_error(
                    &operation_id,
                    "provider authorization expired, reconnection required",
                );
                break;
            }
            Err(err) => {
                // Transport/auth failures stop the loop; restarting is the
                // caller's decision
                shared.stop();
                observer.on_error(&operation_id, &err.to_string());
                break;
            }
            Ok(check) if check.is_terminal => {
                shared.stop();

                let status = OperationStatus::normalize(&check.status).unwrap_or_else(|| {
                    tracing::warn!(
                        "Operation {} reported unknown terminal status {:?}, treating as completed",
                        operation_id,
                        check.status
                    );
                    OperationStatus::Completed
                });

                let metadata = ReconcileMetadata {
                    result_payload: check.result_payload,
                    error_message: check.error_message,
                    ..Default::default()
                };

                match reconciler::reconcile(&db, &operation_id, status, metadata).await {
                    Ok(outcome) => observer.on_complete(&outcome.operation),
                    Err(e) => {
                        tracing::error!("Failed to reconcile {}: {}", operation_id, e);
                        observer.on_error(&operation_id, &e.to_string());
                    }
                }
                break;
            }
            Ok(_) => {
                let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;

                if let Err(e) =
                    operation_store::record_attempt(&db, &operation_id, attempt).await
                {
                    tracing::warn!(
                        "Failed to persist attempt {} for {}: {}",
                        attempt,
                        operation_id,
                        e
                    );
                }

                if attempt >= config.max_attempts {
                    shared.stop();
                    observer.on_timeout(&operation_id);
                    break;
                }

                delay = config.backoff.next_delay(attempt);
            }
        }
    }

    shared.active.store(false, Ordering::SeqCst);
}

/// One poll worker per in-flight operation; starting an operation that is
/// already being polled stops and replaces the previous loop
#[derive(Clone)]
pub struct PollerRegistry {
    db: DatabaseConnection,
    source: Arc<dyn StatusSource>,
    observer: Arc<dyn PollObserver>,
    config: PollConfig,
    workers: Arc<Mutex<HashMap<String, PollWorker>>>,
}

impl PollerRegistry {
    pub fn new(
        db: DatabaseConnection,
        source: Arc<dyn StatusSource>,
        observer: Arc<dyn PollObserver>,
        config: PollConfig,
    ) -> Self {
        Self {
            db,
            source,
            observer,
            config,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn start(&self, operation_id: &str) {
        let mut worker = self.make_worker();
        worker.start(operation_id);
        self.install(operation_id, worker);
    }

    pub fn resume(&self, operation_id: &str, attempts: u32) {
        let mut worker = self.make_worker();
        worker.resume(operation_id, attempts);
        self.install(operation_id, worker);
    }

    pub fn stop(&self, operation_id: &str) {
        if let Some(worker) = self.workers.lock().remove(operation_id) {
            worker.stop();
        }
    }

    pub fn snapshot(&self, operation_id: &str) -> Option<PollSnapshot> {
        self.workers
            .lock()
            .get(operation_id)
            .map(|w| w.snapshot())
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    fn make_worker(&self) -> PollWorker {
        PollWorker::new(
            self.db.clone(),
            self.source.clone(),
            self.observer.clone(),
            self.config.clone(),
        )
    }

    fn install(&self, operation_id: &str, worker: PollWorker) {
        let mut workers = self.workers.lock();
        if let Some(previous) = workers.insert(operation_id.to_string(), worker) {
            // Dropping the previous worker stops its loop
            previous.stop();
        }
        // Drop finished workers so the map does not grow with dead entries
        workers.retain(|_, w| w.is_active());
    }
}
