use crate::models::document::ProcessingRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// One poll attempt against the result store, keyed by the uploaded object.
#[async_trait]
pub trait RecordFetch: Send + Sync {
    async fn fetch_by_key(&self, key: &str) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The record materialized.
    Found(ProcessingRecord),
    /// Expected transient state: the backend has not produced a result yet.
    /// Never surfaced as an error.
    NotReady,
    /// Network or server failure. Retried on the longer delay and surfaced as
    /// an informational message.
    Transport(String),
}

#[derive(Debug, Clone)]
pub enum PollEvent {
    /// Non-fatal failure; polling continues in the background.
    Retrying { message: String },
    /// Terminal success. No further events follow.
    Resolved(Box<ProcessingRecord>),
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub not_found_delay: Duration,
    pub error_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1500),
            not_found_delay: Duration::from_millis(5000),
            error_delay: Duration::from_millis(7000),
        }
    }
}

impl PollConfig {
    pub fn from_app_config(config: &crate::config::AppConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.poll_initial_delay_ms),
            not_found_delay: Duration::from_millis(config.poll_not_found_delay_ms),
            error_delay: Duration::from_millis(config.poll_error_delay_ms),
        }
    }
}

/// Polls the result store for one key until a record appears or the caller
/// cancels. At most one request is in flight at a time.
pub struct ResultPoller {
    fetch: Arc<dyn RecordFetch>,
    config: PollConfig,
}

/// Handle to a running poll. Cancelling (or dropping) releases the pending
/// timer and any in-flight request; no event fires afterwards.
pub struct PollHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Wait for the polling task to wind down.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}

impl ResultPoller {
    pub fn new(fetch: Arc<dyn RecordFetch>, config: PollConfig) -> Self {
        Self { fetch, config }
    }

    /// Spawn the polling loop for `key`.
    pub fn start(&self, key: String) -> (PollHandle, mpsc::UnboundedReceiver<PollEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let fetch = self.fetch.clone();
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let mut delay = config.initial_delay;
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = sleep(delay) => {}
                }

                let outcome = tokio::select! {
                    _ = cancel_rx.changed() => break,
                    outcome = fetch.fetch_by_key(&key) => outcome,
                };

                match outcome {
                    FetchOutcome::Found(record) => {
                        debug!("processing record resolved for {key}");
                        let _ = event_tx.send(PollEvent::Resolved(Box::new(record)));
                        break;
                    }
                    FetchOutcome::NotReady => {
                        debug!("no processing record yet for {key}");
                        delay = config.not_found_delay;
                    }
                    FetchOutcome::Transport(message) => {
                        warn!("poll attempt for {key} failed: {message}");
                        let _ = event_tx.send(PollEvent::Retrying { message });
                        delay = config.error_delay;
                    }
                }
            }
        });

        (
            PollHandle {
                cancel: cancel_tx,
                task: Some(task),
            },
            event_rx,
        )
    }
}
