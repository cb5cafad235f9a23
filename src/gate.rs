//! Resource gate: serialized, FIFO access to the synthesis engine
//!
//! Every edit goes through a single bounded queue. One worker task owns the
//! engine and runs tickets one at a time in arrival order, so the engine never
//! sees two concurrent calls.
//!
//! Ticket lifecycle:
//!
//! ```text
//! Queued -> Running -> Completed | Failed
//! Queued -> Cancelled            (deadline elapsed or caller went away)
//! ```
//!
//! A Running ticket cannot be preempted. If its caller times out or
//! disconnects, the engine call runs to completion and the result is dropped.

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GateConfig;
use crate::engine::{EditOrchestrator, EditResult, SynthesisEngine};
use crate::error::{AppError, Result};
use crate::validation::EditRequest;

/// One admitted request waiting for the engine
struct Ticket {
    id: Uuid,
    request: EditRequest,
    deadline: Instant,
    response_tx: oneshot::Sender<Result<EditResult>>,
}

/// State shared between callers and the worker
struct Shared {
    queue: Mutex<VecDeque<Ticket>>,
    notify: Notify,
    max_queue_depth: usize,
    running: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

impl Shared {
    /// Remove a still-queued ticket. Returns false once the worker has taken it.
    fn withdraw(&self, id: Uuid) -> bool {
        let mut queue = self.queue.lock();
        match queue.iter().position(|t| t.id == id) {
            Some(index) => {
                queue.remove(index);
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    async fn next_ticket(&self) -> Ticket {
        loop {
            let next = self.queue.lock().pop_front();
            if let Some(ticket) = next {
                return ticket;
            }
            self.notify.notified().await;
        }
    }
}

/// Withdraws the ticket if the submitting future is dropped while queued
struct WithdrawOnDrop {
    shared: Arc<Shared>,
    id: Uuid,
}

impl Drop for WithdrawOnDrop {
    fn drop(&mut self) {
        if self.shared.withdraw(self.id) {
            info!(ticket_id = %self.id, "Caller went away; ticket removed from queue");
        }
    }
}

/// Gate statistics
#[derive(Debug, Clone, Serialize)]
pub struct GateStats {
    pub queue_depth: usize,
    pub max_queue_depth: usize,
    pub running: bool,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
}

/// Single point of access to the synthesis engine
pub struct ResourceGate {
    shared: Arc<Shared>,
    request_timeout: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceGate {
    /// Create a gate. No engine is attached until [`ResourceGate::start`].
    pub fn new(config: &GateConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                max_queue_depth: config.max_queue_depth,
                running: AtomicBool::new(false),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
            request_timeout: config.request_timeout(),
            worker: Mutex::new(None),
        }
    }

    /// Hand the engine to the gate and start serving tickets.
    ///
    /// The engine moves into the worker task; nothing else can reach it.
    pub fn start(&self, engine: Box<dyn SynthesisEngine>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(AppError::Internal("resource gate already started".to_string()));
        }

        info!(
            engine = %engine.name(),
            max_queue_depth = self.shared.max_queue_depth,
            "Starting resource gate worker"
        );

        let shared = self.shared.clone();
        *worker = Some(tokio::spawn(run_worker(shared, engine)));
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Submit a request and wait for its result.
    ///
    /// Fails fast with [`AppError::ResourceBusy`] when the queue is full.
    pub async fn submit(&self, request: EditRequest) -> Result<EditResult> {
        if !self.is_started() {
            return Err(AppError::ModelNotReady);
        }

        let id = Uuid::new_v4();
        let deadline = Instant::now() + self.request_timeout;
        let (response_tx, response_rx) = oneshot::channel();

        let depth = {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.max_queue_depth {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    queue_depth = queue.len(),
                    max_queue_depth = self.shared.max_queue_depth,
                    "Queue full; rejecting request"
                );
                return Err(AppError::ResourceBusy(format!(
                    "Server is busy: {} requests already waiting",
                    queue.len()
                )));
            }
            queue.push_back(Ticket {
                id,
                request,
                deadline,
                response_tx,
            });
            queue.len()
        };
        self.shared.notify.notify_one();

        debug!(ticket_id = %id, queue_depth = depth, "Ticket queued");

        let guard = WithdrawOnDrop {
            shared: self.shared.clone(),
            id,
        };

        let outcome = match tokio::time::timeout_at(deadline, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::Internal(
                "ticket was dropped without a result".to_string(),
            )),
            Err(_) if self.shared.withdraw(id) => {
                info!(ticket_id = %id, "Deadline elapsed while queued; ticket cancelled");
                Err(AppError::Timeout(
                    "Request timed out while waiting for the model".to_string(),
                ))
            }
            Err(_) => {
                warn!(
                    ticket_id = %id,
                    "Deadline elapsed while running; engine result will be discarded"
                );
                Err(AppError::Timeout(
                    "Request timed out while the model was processing it".to_string(),
                ))
            }
        };

        drop(guard);
        outcome
    }

    /// Current queue depth
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Number of completed edits
    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Get gate statistics
    pub fn stats(&self) -> GateStats {
        GateStats {
            queue_depth: self.queue_depth(),
            max_queue_depth: self.shared.max_queue_depth,
            running: self.shared.running.load(Ordering::Relaxed),
            completed: self.completed_count(),
            failed: self.shared.failed.load(Ordering::Relaxed),
            cancelled: self.shared.cancelled.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ResourceGate {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_worker(shared: Arc<Shared>, mut engine: Box<dyn SynthesisEngine>) {
    let orchestrator = EditOrchestrator::new();

    loop {
        let ticket = shared.next_ticket().await;

        if ticket.response_tx.is_closed() {
            shared.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(ticket_id = %ticket.id, "Skipping ticket whose caller went away");
            continue;
        }
        if Instant::now() >= ticket.deadline {
            shared.cancelled.fetch_add(1, Ordering::Relaxed);
            let _ = ticket.response_tx.send(Err(AppError::Timeout(
                "Request timed out while waiting for the model".to_string(),
            )));
            continue;
        }

        shared.running.store(true, Ordering::Relaxed);
        let started = Instant::now();
        debug!(ticket_id = %ticket.id, "Ticket running");

        let execution = orchestrator.execute(engine.as_mut(), ticket.request);
        let outcome = match AssertUnwindSafe(execution).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(ticket_id = %ticket.id, "Engine panicked during edit");
                Err(AppError::Engine("engine failed unexpectedly".to_string()))
            }
        };

        let elapsed = started.elapsed();
        shared.running.store(false, Ordering::Relaxed);

        let outcome = match outcome {
            Ok(mut result) => {
                result.processing_time = elapsed;
                shared.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    ticket_id = %ticket.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    generated_images = result.generated_images,
                    "Ticket completed"
                );
                Ok(result)
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    ticket_id = %ticket.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Ticket failed"
                );
                Err(e)
            }
        };

        if ticket.response_tx.send(outcome).is_err() {
            warn!(ticket_id = %ticket.id, "Caller no longer waiting; result discarded");
        }
    }
}
