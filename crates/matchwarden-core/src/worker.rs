//! Single-claim polling worker over the filesystem outbox.
//!
//! Each tick claims at most one event, invokes the handler, and
//! transitions the event by the handler's verdict:
//!
//! - `Ok(Disposition::Done)` → `done/`
//! - `Ok(Disposition::RetryLater)` → back to `pending/`
//! - `Err(_)` → `failed/` with a reason sidecar
//!
//! Cancellation is cooperative: it is checked before each claim and at
//! the inter-tick sleep. A handler invocation in flight runs to
//! completion; every step of the risk pipeline is individually durable,
//! so stopping between steps is safe.
//!
//! There is no ordering guarantee across events (directory listing
//! order is unspecified); within one event progress is strictly
//! sequential.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::outbox::{Claimed, Outbox, OutboxError};

/// Handler verdict for a successfully processed claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The event is fully handled; move it to `done/`.
    Done,
    /// The event is not ready yet (grace window); requeue it verbatim.
    RetryLater,
}

/// Error type handlers surface to the worker; the display form becomes
/// the `failed/` reason sidecar.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Outbox root directory.
    pub outbox_dir: PathBuf,
    /// Sleep between claim attempts.
    pub poll_interval: Duration,
    /// Claim and handle a single event, then exit.
    pub once: bool,
}

/// Errors from worker construction or the claim path.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The configuration is unusable.
    #[error("invalid worker config: {0}")]
    InvalidConfig(&'static str),

    /// The outbox directories could not be prepared.
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

/// The polling worker.
#[derive(Debug)]
pub struct Worker {
    outbox: Outbox,
    config: WorkerConfig,
}

impl Worker {
    /// Creates a worker and ensures the outbox directories exist.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::InvalidConfig`] for a zero poll interval,
    /// or [`WorkerError::Outbox`] if the outbox cannot be prepared.
    pub fn new(config: WorkerConfig) -> Result<Self, WorkerError> {
        if config.poll_interval.is_zero() {
            return Err(WorkerError::InvalidConfig("poll_interval must be > 0"));
        }
        let outbox = Outbox::new(&config.outbox_dir);
        outbox.ensure()?;
        Ok(Self { outbox, config })
    }

    /// The outbox this worker claims from.
    #[must_use]
    pub const fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Runs the worker until cancelled (continuous mode) or for a single
    /// claim (once mode).
    ///
    /// The handler receives the claimed event and the cancellation
    /// token; it is never interrupted mid-call.
    ///
    /// # Errors
    ///
    /// Claim and transition errors are logged and do not stop the loop;
    /// this returns `Err` only if the worker cannot make progress at
    /// all (currently never after construction).
    pub async fn run<H>(
        &self,
        cancel: CancellationToken,
        mut handler: H,
    ) -> Result<(), WorkerError>
    where
        H: FnMut(&Claimed, &CancellationToken) -> Result<Disposition, HandlerError>,
    {
        if self.config.once {
            self.tick(&cancel, &mut handler);
            return Ok(());
        }

        loop {
            if cancel.is_cancelled() {
                info!("worker cancelled");
                return Ok(());
            }

            self.tick(&cancel, &mut handler);

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("worker cancelled");
                    return Ok(());
                },
                () = tokio::time::sleep(self.config.poll_interval) => {},
            }
        }
    }

    /// One claim-handle-transition cycle.
    fn tick<H>(&self, cancel: &CancellationToken, handler: &mut H)
    where
        H: FnMut(&Claimed, &CancellationToken) -> Result<Disposition, HandlerError>,
    {
        let claimed = match self.outbox.claim_one() {
            Ok(claimed) => claimed,
            Err(OutboxError::NoPending) => {
                if self.config.once {
                    info!("no pending events (once mode)");
                } else {
                    debug!("no pending events");
                }
                return;
            },
            Err(e) => {
                warn!(error = %e, "claim error");
                return;
            },
        };

        let id = claimed.event.id.clone();
        match handler(&claimed, cancel) {
            Ok(Disposition::Done) => {
                if let Err(e) = self.outbox.mark_done(&claimed.processing_path) {
                    warn!(event = %id, error = %e, "mark done failed");
                }
            },
            Ok(Disposition::RetryLater) => {
                if let Err(e) = self.outbox.requeue(&claimed.processing_path) {
                    warn!(event = %id, error = %e, "requeue failed");
                }
            },
            Err(handler_err) => {
                warn!(event = %id, error = %handler_err, "handler failed");
                if let Err(e) = self
                    .outbox
                    .mark_failed(&claimed.processing_path, &handler_err.to_string())
                {
                    warn!(event = %id, error = %e, "mark failed failed");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::outbox::Event;

    fn setup() -> (TempDir, Worker) {
        let dir = TempDir::new().unwrap();
        let worker = Worker::new(WorkerConfig {
            outbox_dir: dir.path().join("outbox"),
            poll_interval: Duration::from_millis(5),
            once: true,
        })
        .unwrap();
        (dir, worker)
    }

    fn count(worker: &Worker, state: &str) -> usize {
        fs::read_dir(worker.outbox().root().join(state)).map_or(0, |e| e.count())
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = Worker::new(WorkerConfig {
            outbox_dir: dir.path().join("outbox"),
            poll_interval: Duration::ZERO,
            once: false,
        })
        .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn once_mode_marks_done_on_success() {
        let (_tmp, worker) = setup();
        worker
            .outbox()
            .enqueue(&Event::match_finalized("dev", "M1", Utc::now()))
            .unwrap();

        worker
            .run(CancellationToken::new(), |_, _| Ok(Disposition::Done))
            .await
            .unwrap();

        assert_eq!(count(&worker, "done"), 1);
        assert_eq!(count(&worker, "pending"), 0);
    }

    #[tokio::test]
    async fn retry_later_requeues_verbatim() {
        let (_tmp, worker) = setup();
        let event = Event::match_finalized("dev", "M1", Utc::now());
        worker.outbox().enqueue(&event).unwrap();

        worker
            .run(CancellationToken::new(), |_, _| {
                Ok(Disposition::RetryLater)
            })
            .await
            .unwrap();

        assert_eq!(count(&worker, "pending"), 1);
        let requeued = worker.outbox().claim_one().unwrap();
        assert_eq!(requeued.event, event);
    }

    #[tokio::test]
    async fn handler_error_moves_event_to_failed_with_sidecar() {
        let (_tmp, worker) = setup();
        worker
            .outbox()
            .enqueue(&Event::match_finalized("dev", "M1", Utc::now()))
            .unwrap();

        worker
            .run(CancellationToken::new(), |_, _| {
                Err("telemetry missing".into())
            })
            .await
            .unwrap();

        assert_eq!(count(&worker, "failed"), 2); // event + sidecar
        let sidecars = fs::read_dir(worker.outbox().root().join("failed"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".err.txt"))
            .count();
        assert_eq!(sidecars, 1);
    }

    #[tokio::test]
    async fn once_mode_exits_cleanly_with_nothing_pending() {
        let (_tmp, worker) = setup();
        worker
            .run(CancellationToken::new(), |_, _| Ok(Disposition::Done))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn continuous_mode_stops_on_cancellation() {
        let dir = TempDir::new().unwrap();
        let worker = Worker::new(WorkerConfig {
            outbox_dir: dir.path().join("outbox"),
            poll_interval: Duration::from_millis(1),
            once: false,
        })
        .unwrap();

        for i in 0..3 {
            worker
                .outbox()
                .enqueue(&Event::match_finalized("dev", format!("M{i}"), Utc::now()))
                .unwrap();
        }

        let handled = AtomicUsize::new(0);
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        worker
            .run(cancel, move |_, _cancel| {
                if handled.fetch_add(1, Ordering::SeqCst) == 2 {
                    cancel_clone.cancel();
                }
                Ok(Disposition::Done)
            })
            .await
            .unwrap();

        assert_eq!(count(&worker, "done"), 3);
    }
}
