//! Asynchronous, draining audit writer for [`DecisionTrace`]s.
//!
//! While running, [`TraceLogger::log_trace`] only enqueues; a single Tokio
//! task dequeues in FIFO order and appends each trace to the configured
//! stream of a [`StateStore`] on the blocking thread pool.
//! [`TraceLogger::stop`] closes the queue and waits until every queued trace
//! has been written.
//!
//! When the logger is not running, `log_trace` writes synchronously instead,
//! so a caller that never starts the pipeline still gets every trace on disk.
//! Traces logged while `stop()` is still draining are held back and written
//! right after the queue empties, so the log always follows call order.
//!
//! A write that fails is retried once.  If the retry fails as well the trace
//! is flagged [`PolicyFlag::AuditWriteFailed`], kept in memory as a dead
//! letter, and the consumer moves on to the next trace.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aegis_types::{AegisError, DecisionTrace, PolicyFlag};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::state_store::StateStore;

/// Stream name used when none is configured.
pub const DEFAULT_TRACE_LOG: &str = "decision_traces";

enum State {
    Idle,
    Running {
        queue: mpsc::UnboundedSender<DecisionTrace>,
        consumer: JoinHandle<()>,
    },
    /// `stop()` is waiting for the consumer; late traces wait here.
    Draining { late: Vec<DecisionTrace> },
}

pub struct TraceLogger {
    store: Arc<dyn StateStore>,
    log_name: String,
    state: Mutex<State>,
    dead_letters: Arc<Mutex<Vec<DecisionTrace>>>,
}

impl TraceLogger {
    pub fn new(store: Arc<dyn StateStore>, log_name: impl Into<String>) -> Self {
        Self {
            store,
            log_name: log_name.into(),
            state: Mutex::new(State::Idle),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Spawn the consumer task. A no-op when already running, and while a
    /// `stop()` is still draining.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&self) {
        let mut state = self.state();
        match *state {
            State::Running { .. } => return,
            State::Draining { .. } => {
                warn!(log_name = %self.log_name, "trace logger still draining; start ignored");
                return;
            }
            State::Idle => {}
        }
        let (queue, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(consume(
            rx,
            Arc::clone(&self.store),
            self.log_name.clone(),
            Arc::clone(&self.dead_letters),
        ));
        *state = State::Running { queue, consumer };
        info!(log_name = %self.log_name, "trace logger started");
    }

    /// Close the queue, wait for every queued trace to be written, then halt
    /// the consumer. A no-op when not running; the logger may be started again.
    pub async fn stop(&self) {
        let consumer = {
            let mut state = self.state();
            match std::mem::replace(&mut *state, State::Draining { late: Vec::new() }) {
                State::Running { queue, consumer } => {
                    drop(queue);
                    consumer
                }
                other => {
                    *state = other;
                    return;
                }
            }
        };
        if let Err(e) = consumer.await {
            error!(log_name = %self.log_name, error = %e, "trace logger consumer aborted");
        }

        // Held while the late traces are written so a concurrent synchronous
        // write cannot overtake them.
        let mut state = self.state();
        if let State::Draining { late } = std::mem::replace(&mut *state, State::Idle) {
            for trace in late {
                persist(self.store.as_ref(), &self.log_name, trace, &self.dead_letters);
            }
        }
        drop(state);
        info!(log_name = %self.log_name, "trace logger stopped");
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state(), State::Running { .. })
    }

    /// Record `trace`.
    ///
    /// Enqueues and returns immediately while running (or while `stop()` is
    /// draining); otherwise writes through the store before returning.
    ///
    /// # Errors
    ///
    /// Only the synchronous path fails: [`AegisError::StorageIo`] or
    /// [`AegisError::Serialization`] from the store.
    pub fn log_trace(&self, trace: DecisionTrace) -> Result<(), AegisError> {
        let trace = {
            let mut state = self.state();
            match &mut *state {
                State::Running { queue, .. } => match queue.send(trace) {
                    Ok(()) => return Ok(()),
                    // Consumer already gone; persist inline.
                    Err(mpsc::error::SendError(trace)) => trace,
                },
                State::Draining { late } => {
                    late.push(trace);
                    return Ok(());
                }
                State::Idle => trace,
            }
        };
        self.log_trace_sync(trace)
    }

    /// Write `trace` immediately, bypassing the queue.
    pub fn log_trace_sync(&self, mut trace: DecisionTrace) -> Result<(), AegisError> {
        trace.ensure_finished();
        write(self.store.as_ref(), &self.log_name, &trace)?;
        debug!(trace_id = %trace.trace_id, log_name = %self.log_name, "trace written synchronously");
        Ok(())
    }

    /// Traces that could not be written after a retry, in failure order.
    pub fn dead_letters(&self) -> Vec<DecisionTrace> {
        lock(&self.dead_letters).clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn consume(
    mut rx: mpsc::UnboundedReceiver<DecisionTrace>,
    store: Arc<dyn StateStore>,
    log_name: String,
    dead_letters: Arc<Mutex<Vec<DecisionTrace>>>,
) {
    while let Some(trace) = rx.recv().await {
        let store = Arc::clone(&store);
        let name = log_name.clone();
        let dead_letters = Arc::clone(&dead_letters);
        // One write at a time keeps FIFO order.
        let written = tokio::task::spawn_blocking(move || {
            persist(store.as_ref(), &name, trace, &dead_letters);
        })
        .await;
        if let Err(e) = written {
            error!(log_name = %log_name, error = %e, "trace write task failed");
        }
    }
}

/// Stamp, write, retry once, dead-letter on the second failure.
fn persist(
    store: &dyn StateStore,
    log_name: &str,
    mut trace: DecisionTrace,
    dead_letters: &Mutex<Vec<DecisionTrace>>,
) {
    trace.ensure_finished();
    if let Err(first) = write(store, log_name, &trace) {
        warn!(trace_id = %trace.trace_id, log_name, error = %first, "trace write failed, retrying");
        if let Err(second) = write(store, log_name, &trace) {
            error!(trace_id = %trace.trace_id, log_name, error = %second, "trace dead-lettered");
            trace.policy_flags.insert(PolicyFlag::AuditWriteFailed);
            lock(dead_letters).push(trace);
            return;
        }
    }
    debug!(trace_id = %trace.trace_id, log_name, "trace written");
}

fn write(store: &dyn StateStore, log_name: &str, trace: &DecisionTrace) -> Result<(), AegisError> {
    let record = serde_json::to_value(trace)?;
    store.append_jsonl(log_name, &record)
}
