//! Training supervisor: runs a classifier's `fit` on a worker thread, polls the
//! caller's cancellation source on a fixed interval and classifies the result.
//!
//! Cancellation is cooperative. The supervisor raises the worker's
//! [`StopFlag`], waits at most the configured grace period for the worker to
//! acknowledge, then reports `Cancelled` and detaches the worker. A result that
//! arrives after that is dropped.
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::SupervisorConfig;
use crate::convert::Dataset;
use crate::error::{CoreError, FitError};
use crate::models::MultiLabelClassifier;
use crate::progress::CancellationSource;

/// Stop request shared between the supervisor and a training worker.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn should_stop(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// How a training run ended.
pub enum TrainingOutcome<M = Box<dyn MultiLabelClassifier>> {
    Trained(M),
    /// The algorithm cannot learn one of the label columns.
    ClassTypeIncompatible(String),
    /// The algorithm cannot use one of the input columns.
    AttributeTypeIncompatible(String),
    Cancelled,
    Failed(anyhow::Error),
}

impl<M> TrainingOutcome<M> {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainingOutcome::Trained(_))
    }

    pub fn state(&self) -> TaskState {
        match self {
            TrainingOutcome::Trained(_) => TaskState::Completed,
            TrainingOutcome::Cancelled => TaskState::Cancelled,
            _ => TaskState::Failed,
        }
    }

    pub fn into_model(self) -> Option<M> {
        match self {
            TrainingOutcome::Trained(m) => Some(m),
            _ => None,
        }
    }

    pub fn map<N, F: FnOnce(M) -> N>(self, f: F) -> TrainingOutcome<N> {
        match self {
            TrainingOutcome::Trained(m) => TrainingOutcome::Trained(f(m)),
            TrainingOutcome::ClassTypeIncompatible(msg) => TrainingOutcome::ClassTypeIncompatible(msg),
            TrainingOutcome::AttributeTypeIncompatible(msg) => {
                TrainingOutcome::AttributeTypeIncompatible(msg)
            }
            TrainingOutcome::Cancelled => TrainingOutcome::Cancelled,
            TrainingOutcome::Failed(e) => TrainingOutcome::Failed(e),
        }
    }

    /// User facing message for everything but a successful run.
    pub fn message(&self) -> Option<String> {
        match self {
            TrainingOutcome::Trained(_) => None,
            TrainingOutcome::ClassTypeIncompatible(msg) => {
                Some(format!("Class (target) column is incompatible: {}", msg))
            }
            TrainingOutcome::AttributeTypeIncompatible(msg) => {
                Some(format!("Attribute (input) column is incompatible: {}", msg))
            }
            TrainingOutcome::Cancelled => Some("Training was cancelled".to_string()),
            TrainingOutcome::Failed(e) => Some(format!("Training failed: {:#}", e)),
        }
    }
}

impl<M> fmt::Debug for TrainingOutcome<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingOutcome::Trained(_) => f.write_str("Trained(..)"),
            TrainingOutcome::ClassTypeIncompatible(msg) => {
                f.debug_tuple("ClassTypeIncompatible").field(msg).finish()
            }
            TrainingOutcome::AttributeTypeIncompatible(msg) => {
                f.debug_tuple("AttributeTypeIncompatible").field(msg).finish()
            }
            TrainingOutcome::Cancelled => f.write_str("Cancelled"),
            TrainingOutcome::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

enum WorkerReport {
    Finished(Box<dyn MultiLabelClassifier>, Result<(), FitError>),
    Panicked(String),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn classify(report: WorkerReport) -> TrainingOutcome {
    match report {
        WorkerReport::Finished(model, Ok(())) => TrainingOutcome::Trained(model),
        WorkerReport::Finished(_, Err(FitError::UnsupportedClassType(msg))) => {
            TrainingOutcome::ClassTypeIncompatible(msg)
        }
        WorkerReport::Finished(_, Err(FitError::UnsupportedAttributeType(msg))) => {
            TrainingOutcome::AttributeTypeIncompatible(msg)
        }
        WorkerReport::Finished(_, Err(FitError::Interrupted)) => TrainingOutcome::Cancelled,
        WorkerReport::Finished(_, Err(FitError::Other(e))) => TrainingOutcome::Failed(e),
        WorkerReport::Panicked(msg) => {
            TrainingOutcome::Failed(anyhow::anyhow!("classifier panicked during training: {}", msg))
        }
    }
}

/// One training run on its own worker thread.
pub struct TrainingTask {
    state: TaskState,
    stop: StopFlag,
    pending: Option<(Box<dyn MultiLabelClassifier>, Arc<Dataset>)>,
    receiver: Option<Receiver<WorkerReport>>,
    worker: Option<JoinHandle<()>>,
}

impl TrainingTask {
    pub fn new(model: Box<dyn MultiLabelClassifier>, data: Arc<Dataset>) -> Self {
        Self {
            state: TaskState::Pending,
            stop: StopFlag::new(),
            pending: Some((model, data)),
            receiver: None,
            worker: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Spawn the worker thread. Calling this twice is an error.
    pub fn start(&mut self) -> Result<(), CoreError> {
        let (mut model, data) = self
            .pending
            .take()
            .ok_or_else(|| CoreError::InvalidInput("training task already started".to_string()))?;
        let (tx, rx) = mpsc::channel();
        let stop = self.stop.clone();
        let name = model.name().to_string();

        let handle = thread::Builder::new()
            .name(format!("train-{}", name))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| model.fit(&data, &stop)));
                let report = match result {
                    Ok(fit) => WorkerReport::Finished(model, fit),
                    Err(payload) => WorkerReport::Panicked(panic_message(payload.as_ref())),
                };
                if tx.send(report).is_err() {
                    log::debug!("Training worker '{}' finished after the supervisor detached", name);
                }
            })
            .map_err(|e| CoreError::Other(anyhow::Error::new(e).context("failed to spawn training worker")))?;

        self.receiver = Some(rx);
        self.worker = Some(handle);
        self.state = TaskState::Running;
        Ok(())
    }

    /// Raise the stop flag. The worker observes it at its next checkpoint.
    pub fn request_cancel(&mut self) {
        self.stop.request_stop();
        if matches!(self.state, TaskState::Pending | TaskState::Running) {
            self.state = TaskState::Cancelled;
        }
    }

    /// Wait up to `timeout` for the worker's result. `None` while it is still
    /// running. After a cancel request any result is reported as `Cancelled`.
    pub fn wait_for(&mut self, timeout: Duration) -> Option<TrainingOutcome> {
        let receiver = self.receiver.as_ref()?;
        let report = match receiver.recv_timeout(timeout) {
            Ok(report) => report,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                self.finish(TaskState::Failed);
                return Some(TrainingOutcome::Failed(anyhow::anyhow!(
                    "training worker exited without reporting a result"
                )));
            }
        };

        if self.stop.should_stop() {
            self.finish(TaskState::Cancelled);
            return Some(TrainingOutcome::Cancelled);
        }
        let outcome = classify(report);
        self.finish(outcome.state());
        Some(outcome)
    }

    fn finish(&mut self, state: TaskState) {
        self.state = state;
        self.receiver = None;
        if let Some(handle) = self.worker.take() {
            // The worker has already sent its report, so this returns promptly.
            if handle.join().is_err() {
                log::warn!("Training worker panicked while shutting down");
            }
        }
    }

    /// Give up on the worker without waiting for it.
    fn detach(&mut self) {
        self.receiver = None;
        if self.worker.take().is_some() {
            log::warn!("Training worker did not stop within the grace period; detaching it");
        }
    }
}

/// Result of a supervised run.
#[derive(Debug)]
pub struct TrainingReport {
    pub outcome: TrainingOutcome,
    pub state: TaskState,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrainingSupervisor {
    config: SupervisorConfig,
}

impl TrainingSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Fit `model` on `data`, checking `cancel` once immediately and then
    /// every poll interval until the worker reports.
    pub fn run(
        &self,
        model: Box<dyn MultiLabelClassifier>,
        data: Arc<Dataset>,
        cancel: &dyn CancellationSource,
    ) -> TrainingReport {
        let started = Instant::now();
        let algorithm = model.name().to_string();
        let mut task = TrainingTask::new(model, data);

        let outcome = match task.start() {
            Err(e) => TrainingOutcome::Failed(anyhow::Error::new(e)),
            Ok(()) => {
                log::info!("Training '{}' started", algorithm);
                self.supervise(&mut task, cancel)
            }
        };

        let elapsed = started.elapsed();
        match &outcome {
            TrainingOutcome::Trained(_) => {
                log::info!("Training '{}' completed in {:.2?}", algorithm, elapsed)
            }
            TrainingOutcome::Cancelled => {
                log::info!("Training '{}' cancelled after {:.2?}", algorithm, elapsed)
            }
            other => log::warn!(
                "Training '{}' did not produce a model: {}",
                algorithm,
                other.message().unwrap_or_default()
            ),
        }
        TrainingReport {
            state: outcome.state(),
            outcome,
            elapsed,
        }
    }

    fn supervise(&self, task: &mut TrainingTask, cancel: &dyn CancellationSource) -> TrainingOutcome {
        loop {
            if cancel.is_cancel_requested() {
                task.request_cancel();
                log::info!("Cancellation requested; asking the training worker to stop");
                match task.wait_for(self.config.cancel_grace()) {
                    Some(_) => log::debug!("Training worker acknowledged the stop request"),
                    None => task.detach(),
                }
                return TrainingOutcome::Cancelled;
            }
            if let Some(outcome) = task.wait_for(self.config.poll_interval()) {
                return outcome;
            }
        }
    }
}
