//! Session supervision — keeps exactly one capture session alive.
//!
//! The supervisor runs sessions in a loop: build a fresh
//! [`CaptureSession`], drive it to completion, wait out a backoff chosen by
//! the outcome, rebuild.  Sessions are never reused — rebuilding from the
//! factory guarantees no timer handles or listener registrations leak from
//! one cycle into the next.
//!
//! A failure inside a session surfaces only as [`SessionOutcome::Failed`];
//! nothing a session does can take the supervisor down, and the error
//! backoff is always nonzero so a permanently broken device degrades into a
//! slow retry loop rather than a busy one.
//!
//! The power lease is scoped to the supervisor's active lifetime: acquired
//! once before the first session, released on shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::SupervisorConfig;
use crate::session::{CaptureSession, SessionOutcome};
use crate::sink::PowerLease;

// ---------------------------------------------------------------------------
// SessionFactory
// ---------------------------------------------------------------------------

/// Builds a fresh [`CaptureSession`] for each cycle.
pub type SessionFactory = Box<dyn FnMut() -> CaptureSession + Send>;

// ---------------------------------------------------------------------------
// SupervisorHandle
// ---------------------------------------------------------------------------

/// Requests shutdown of a running supervisor.
///
/// Cloneable and idempotent: the first `shutdown` call wins, later calls
/// are no-ops.
#[derive(Clone)]
pub struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SupervisorHandle {
    /// Ask the supervisor to stop.  The live session (if any) is torn down
    /// immediately: timers cancelled, detector and engine stopped, audio
    /// device released, power lease released last.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

// ---------------------------------------------------------------------------
// SessionSupervisor
// ---------------------------------------------------------------------------

/// Owns at most one live [`CaptureSession`] and restarts it forever.
pub struct SessionSupervisor {
    factory: SessionFactory,
    config: SupervisorConfig,
    power: Arc<dyn PowerLease>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SessionSupervisor {
    /// Create a supervisor and the handle used to stop it.
    pub fn new(
        factory: SessionFactory,
        config: SupervisorConfig,
        power: Arc<dyn PowerLease>,
    ) -> (Self, SupervisorHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                factory,
                config,
                power,
                shutdown_rx,
            },
            SupervisorHandle { shutdown_tx },
        )
    }

    /// Run capture cycles until shutdown is requested.
    ///
    /// Consuming `self` makes a second concurrent run of the same
    /// supervisor impossible — "ensure running" is the act of spawning this
    /// future once.
    pub async fn run(mut self) {
        self.power.acquire();
        log::info!("supervisor: started");

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let session = (self.factory)();

            let outcome = tokio::select! {
                outcome = session.run() => outcome,
                _ = self.shutdown_rx.changed() => {
                    // Dropping the session future tears the session down:
                    // timers aborted, engine and detector stopped, device
                    // released.
                    log::info!("supervisor: shutdown requested, stopping session");
                    break;
                }
            };

            let backoff = match outcome {
                SessionOutcome::Saved | SessionOutcome::Empty => {
                    log::info!("supervisor: session ended ({outcome:?}), restarting");
                    self.config.restart_delay()
                }
                SessionOutcome::Failed => {
                    log::warn!("supervisor: session failed, backing off before restart");
                    self.config.error_backoff()
                }
            };

            tokio::select! {
                _ = sleep(backoff) => {}
                _ = self.shutdown_rx.changed() => break,
            }
        }

        self.power.release();
        log::info!("supervisor: stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
