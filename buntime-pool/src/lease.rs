//! Exclusive, temporary ownership of one worker for one request's lifetime
//! (spec glossary: "Lease").

use buntime_core::AppIdent;
use buntime_worker::WorkerInstance;

use crate::pool::Pool;

/// How a lease's worker should be treated on return (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// Request completed normally; eligible for reuse if not otherwise due
    /// for retirement.
    Ok,
    /// Force retirement even though the worker itself is healthy (e.g. a
    /// plugin flagged the response, or the app was just uninstalled).
    Recycle,
    /// The request failed in a way that makes the worker's state
    /// untrustworthy (crash, cancellation with a partial write); force
    /// retirement.
    Kill,
}

/// Exclusive ownership of a READY-turned-ACTIVE worker, for the duration
/// of one request. Exactly one of [`Lease::release`] or the `Drop` impl's
/// safety-net KILL runs per lease (spec §8, testable property 5).
pub struct Lease {
    pub(crate) worker: Option<WorkerInstance>,
    pub(crate) app: AppIdent,
    pub(crate) pool: Pool,
}

impl Lease {
    pub fn worker(&self) -> &WorkerInstance {
        self.worker.as_ref().expect("lease worker taken twice")
    }

    pub fn worker_mut(&mut self) -> &mut WorkerInstance {
        self.worker.as_mut().expect("lease worker taken twice")
    }

    /// Return the worker to the pool with the given outcome. Consumes the
    /// lease, since a worker may only ever be released once.
    pub async fn release(mut self, outcome: LeaseOutcome) {
        let worker = self.worker.take().expect("lease worker taken twice");
        self.pool.release_worker(self.app.clone(), worker, outcome).await;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // `release` wasn't called — a caller bug, or an early return past
        // it. Don't leak the worker or silently keep it ACTIVE forever:
        // force it through the KILL path on a detached task.
        if let Some(worker) = self.worker.take() {
            tracing::warn!(app = %self.app, "lease dropped without release(), forcing KILL");
            let pool = self.pool.clone();
            let app = self.app.clone();
            tokio::spawn(async move {
                pool.release_worker(app, worker, LeaseOutcome::Kill).await;
            });
        }
    }
}
