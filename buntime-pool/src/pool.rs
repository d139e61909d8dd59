//! Lane map, admission, retirement, and shutdown (spec §4.3).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use buntime_core::{AppIdent, BuntimeError};
use buntime_resolver::load_worker_config;
use buntime_worker::WorkerInstance;

use crate::lease::{Lease, LeaseOutcome};

/// Grace period given to a retired/shutdown worker before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Lane {
    /// Back of the vec is the most-recently-released worker; acquisition
    /// pops from the back (spec §4.3.1: "pick the most-recently-used one").
    ready: Vec<WorkerInstance>,
}

struct Waiter {
    app: AppIdent,
    grant: oneshot::Sender<Result<WorkerInstance, BuntimeError>>,
}

struct PoolState {
    lanes: HashMap<AppIdent, Lane>,
    /// Single global FIFO: a lane's within-lane order is a subsequence of
    /// this queue, and "the lane that has been waiting longest" (spec
    /// §4.3.1 fairness) is always at the front.
    waiters: VecDeque<Waiter>,
    live: usize,
    draining: bool,
}

struct Inner {
    state: Mutex<PoolState>,
    worker_dirs: Vec<PathBuf>,
    max_size: usize,
}

/// A bounded pool of worker instances, keyed by `(name, version)` lane.
/// Cheap to clone; clones share the same underlying state (spec §5: "the
/// pool's internal state is protected by a single lock").
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

/// Point-in-time snapshot of one lane for `/_/admin/metrics` (spec §4.3
/// `metrics()`).
#[derive(Debug, Clone)]
pub struct LaneMetrics {
    pub app: AppIdent,
    pub ready: usize,
}

#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub live: usize,
    pub max_size: usize,
    pub waiting: usize,
    pub lanes: Vec<LaneMetrics>,
}

impl Pool {
    pub fn new(worker_dirs: Vec<PathBuf>, max_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PoolState {
                    lanes: HashMap::new(),
                    waiters: VecDeque::new(),
                    live: 0,
                    draining: false,
                }),
                worker_dirs,
                max_size,
            }),
        }
    }

    /// Acquire a READY worker for `app`, waiting at most `deadline` if the
    /// pool is at capacity (spec §4.3.1, §4.4 step 4).
    pub async fn acquire(&self, app: AppIdent, deadline: Duration) -> Result<Lease, BuntimeError> {
        let start = Instant::now();
        enum Step {
            Leased(WorkerInstance),
            ReserveSpawn,
            Wait(oneshot::Receiver<Result<WorkerInstance, BuntimeError>>),
        }

        let (step, to_terminate) = {
            let mut state = self.inner.state.lock().unwrap();
            if state.draining {
                return Err(shutting_down(&app));
            }
            let mut purged = Vec::new();
            let lane = state.lanes.entry(app.clone()).or_default();
            let mut picked = None;
            while let Some(candidate) = lane.ready.pop() {
                if candidate.retirement_due(Instant::now()) {
                    purged.push(candidate);
                    continue;
                }
                picked = Some(candidate);
                break;
            }
            state.live -= purged.len();

            let step = if let Some(w) = picked {
                Step::Leased(w)
            } else if state.live < self.inner.max_size {
                state.live += 1;
                Step::ReserveSpawn
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { app: app.clone(), grant: tx });
                Step::Wait(rx)
            };
            (step, purged)
        };

        for worker in to_terminate {
            terminate_detached(worker);
        }

        match step {
            Step::Leased(worker) => Ok(self.make_lease(app, worker)),
            Step::ReserveSpawn => match self.spawn_worker(&app).await {
                Ok(worker) => Ok(self.make_lease(app, worker)),
                Err(e) => {
                    self.inner.state.lock().unwrap().live -= 1;
                    Err(e)
                }
            },
            Step::Wait(rx) => {
                let remaining = deadline.checked_sub(start.elapsed()).unwrap_or(Duration::ZERO);
                match tokio::time::timeout(remaining, rx).await {
                    Ok(Ok(Ok(worker))) => Ok(self.make_lease(app, worker)),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Err(_closed)) | Err(_elapsed) => Err(BuntimeError::PoolExhausted {
                        app: app.name.clone(),
                        version: app.version.clone(),
                        retry_after_secs: 1,
                    }),
                }
            }
        }
    }

    /// Return a leased worker to the pool, called by [`Lease::release`]
    /// (and, as a safety net, by its `Drop` impl).
    pub(crate) async fn release_worker(&self, app: AppIdent, worker: WorkerInstance, outcome: LeaseOutcome) {
        let now = Instant::now();
        let draining = self.inner.state.lock().unwrap().draining;
        let retire = draining
            || matches!(outcome, LeaseOutcome::Kill | LeaseOutcome::Recycle)
            || worker.state() != buntime_worker::WorkerState::Ready
            || worker.retirement_due(now)
            || worker.is_ephemeral();

        let waiter = {
            let mut state = self.inner.state.lock().unwrap();
            pop_live_waiter(&mut state)
        };

        match waiter {
            Some(w) if !retire && w.app == app => {
                let _ = w.grant.send(Ok(worker));
            }
            Some(w) => {
                // Slot is owed to a different (or retired-anyway) lane:
                // this worker leaves no matter how healthy it is, and a
                // fresh one is spawned for whoever has waited longest.
                terminate_detached(worker);
                self.grant_by_spawning(w).await;
            }
            None => {
                if retire {
                    self.inner.state.lock().unwrap().live -= 1;
                    terminate_detached(worker);
                } else {
                    self.inner
                        .state
                        .lock()
                        .unwrap()
                        .lanes
                        .entry(app)
                        .or_default()
                        .ready
                        .push(worker);
                }
            }
        }
    }

    /// Retire any READY worker past its threshold, run at least once a
    /// second by the supervisor (spec §4.3.3).
    pub async fn sweep_once(&self) {
        let now = Instant::now();
        let purged: Vec<WorkerInstance> = {
            let mut state = self.inner.state.lock().unwrap();
            let mut out = Vec::new();
            for lane in state.lanes.values_mut() {
                let mut kept = Vec::with_capacity(lane.ready.len());
                for w in lane.ready.drain(..) {
                    if w.retirement_due(now) {
                        out.push(w);
                    } else {
                        kept.push(w);
                    }
                }
                lane.ready = kept;
            }
            state.live -= out.len();
            out
        };

        for worker in purged {
            terminate_detached(worker);
            let waiter = {
                let mut state = self.inner.state.lock().unwrap();
                pop_live_waiter(&mut state)
            };
            if let Some(w) = waiter {
                // Undo this worker's share of the bulk `live -= out.len()`
                // above: its slot is being handed to `w`, not freed.
                self.inner.state.lock().unwrap().live += 1;
                self.grant_by_spawning(w).await;
            }
        }
    }

    /// Stop admission, reject queued waiters, and tear down every idle
    /// worker. Workers released by an in-flight request while draining are
    /// force-retired by `release_worker`'s own draining check.
    pub async fn shutdown(&self, grace: Duration) {
        let ready_now: Vec<WorkerInstance> = {
            let mut state = self.inner.state.lock().unwrap();
            state.draining = true;
            while let Some(w) = state.waiters.pop_front() {
                let _ = w.grant.send(Err(shutting_down(&w.app)));
            }
            let mut out = Vec::new();
            for lane in state.lanes.values_mut() {
                out.extend(lane.ready.drain(..));
            }
            state.live -= out.len();
            out
        };
        for mut worker in ready_now {
            worker.terminate(TERMINATE_GRACE.min(grace)).await;
        }
        tokio::time::sleep(grace).await;
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock().unwrap();
        PoolMetrics {
            live: state.live,
            max_size: self.inner.max_size,
            waiting: state.waiters.len(),
            lanes: state
                .lanes
                .iter()
                .map(|(app, lane)| LaneMetrics { app: app.clone(), ready: lane.ready.len() })
                .collect(),
        }
    }

    /// Whether at least one worker could be acquired on demand right now,
    /// for `/_/ready` (spec §6).
    pub fn has_capacity(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        !state.draining && (state.live < self.inner.max_size || state.lanes.values().any(|l| !l.ready.is_empty()))
    }

    async fn grant_by_spawning(&self, waiter: Waiter) {
        match self.spawn_worker(&waiter.app).await {
            Ok(fresh) => {
                let _ = waiter.grant.send(Ok(fresh));
            }
            Err(e) => {
                self.inner.state.lock().unwrap().live -= 1;
                let _ = waiter.grant.send(Err(e));
            }
        }
    }

    /// Spawn a worker for `app`, retrying once (silently) on failure before
    /// surfacing an error: absorbs a single transient `fork`/`exec` hiccup
    /// without amplifying a genuinely broken app into repeated spawn storms.
    async fn spawn_worker(&self, app: &AppIdent) -> Result<WorkerInstance, BuntimeError> {
        match self.spawn_worker_once(app).await {
            Ok(worker) => Ok(worker),
            Err(first_err) => {
                tracing::warn!(app = %app.name, version = %app.version, error = %first_err, "worker spawn failed, retrying once");
                self.spawn_worker_once(app).await.map_err(|_| first_err)
            }
        }
    }

    async fn spawn_worker_once(&self, app: &AppIdent) -> Result<WorkerInstance, BuntimeError> {
        let abs_dir = self
            .inner
            .worker_dirs
            .iter()
            .map(|dir| dir.join(&app.name).join(&app.version))
            .find(|p| p.is_dir())
            .ok_or_else(|| BuntimeError::AppNotFound {
                app: app.name.clone(),
                range: Some(app.version.clone()),
            })?;
        let config = load_worker_config(&abs_dir).map_err(|e| BuntimeError::InvalidManifest {
            path: abs_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        WorkerInstance::spawn(app.clone(), &abs_dir, config).await
    }

    fn make_lease(&self, app: AppIdent, worker: WorkerInstance) -> Lease {
        Lease { worker: Some(worker), app, pool: self.clone() }
    }
}

/// Pop waiters off the front until one whose receiver is still live is
/// found (a timed-out `acquire` dropped its receiver, closing the sender).
fn pop_live_waiter(state: &mut PoolState) -> Option<Waiter> {
    while let Some(waiter) = state.waiters.pop_front() {
        if !waiter.grant.is_closed() {
            return Some(waiter);
        }
    }
    None
}

fn terminate_detached(mut worker: WorkerInstance) {
    tokio::spawn(async move {
        worker.terminate(TERMINATE_GRACE).await;
    });
}

fn shutting_down(app: &AppIdent) -> BuntimeError {
    BuntimeError::AppUnavailable {
        app: app.name.clone(),
        version: app.version.clone(),
        reason: "pool is shutting down".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buntime_resolver::WorkerConfig;
    use buntime_worker::WorkerInstance as Worker;

    fn cfg(ttl_ms: u64, idle_timeout_ms: u64, max_requests: u64) -> WorkerConfig {
        WorkerConfig {
            entrypoint: "server.js".into(),
            timeout_ms: 1000,
            ttl_ms,
            idle_timeout_ms,
            max_requests,
            auto_install: false,
            low_memory: false,
        }
    }

    #[tokio::test]
    async fn acquire_reuses_a_released_healthy_worker() {
        let pool = Pool::new(vec![], 4);
        let app = AppIdent::new("hello", "1.0.0");
        let worker = Worker::for_test(app.clone(), cfg(60_000, 60_000, 1000)).await;
        let id = worker.id;
        let lease = pool.make_lease(app.clone(), worker);
        lease.release(LeaseOutcome::Ok).await;

        let lease = pool.acquire(app, Duration::from_millis(50)).await.unwrap();
        assert_eq!(lease.worker().id, id);
    }

    #[tokio::test]
    async fn released_ephemeral_worker_is_not_reused() {
        let pool = Pool::new(vec![], 4);
        let app = AppIdent::new("hello", "1.0.0");
        let worker = Worker::for_test(app.clone(), cfg(0, 60_000, 1000)).await;
        // ttl_ms == 0 means ephemeral.
        let lease = pool.make_lease(app.clone(), worker);
        lease.release(LeaseOutcome::Ok).await;

        let metrics = pool.metrics();
        assert_eq!(metrics.live, 0);
        assert_eq!(metrics.lanes.iter().map(|l| l.ready).sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn recycle_outcome_forces_retirement_of_a_healthy_worker() {
        let pool = Pool::new(vec![], 4);
        let app = AppIdent::new("hello", "1.0.0");
        let worker = Worker::for_test(app.clone(), cfg(60_000, 60_000, 1000)).await;
        let lease = pool.make_lease(app.clone(), worker);
        lease.release(LeaseOutcome::Recycle).await;

        assert_eq!(pool.metrics().live, 0);
    }

    #[tokio::test]
    async fn pool_exhaustion_times_out_with_pool_exhausted() {
        let pool = Pool::new(vec![], 1);
        let app = AppIdent::new("hello", "1.0.0");
        let worker = Worker::for_test(app.clone(), cfg(60_000, 60_000, 1000)).await;
        // Occupy the only slot without releasing it.
        let _lease = pool.make_lease(app.clone(), worker);
        pool.inner.state.lock().unwrap().live = 1;

        let err = pool
            .acquire(AppIdent::new("other", "1.0.0"), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, BuntimeError::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn shutdown_rejects_queued_waiters() {
        let pool = Pool::new(vec![], 1);
        let app = AppIdent::new("hello", "1.0.0");
        let worker = Worker::for_test(app.clone(), cfg(60_000, 60_000, 1000)).await;
        let _lease = pool.make_lease(app.clone(), worker);
        pool.inner.state.lock().unwrap().live = 1;

        let waiter_pool = pool.clone();
        let waiter_app = app.clone();
        let waiter = tokio::spawn(async move {
            waiter_pool.acquire(waiter_app, Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.shutdown(Duration::from_millis(10)).await;

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(BuntimeError::AppUnavailable { .. })));
    }

    #[tokio::test]
    async fn sweep_retires_idle_ready_workers() {
        let pool = Pool::new(vec![], 4);
        let app = AppIdent::new("hello", "1.0.0");
        let mut worker = Worker::for_test(app.clone(), cfg(0, 10, 1000)).await;
        worker.set_last_activity_at_for_test(Instant::now() - Duration::from_millis(50));
        let lease = pool.make_lease(app.clone(), worker);
        // A non-ephemeral lane keeps the worker on OK release so the sweep
        // is what has to retire it.
        pool.inner
            .state
            .lock()
            .unwrap()
            .lanes
            .entry(app.clone())
            .or_default()
            .ready
            .push(lease.worker.unwrap());
        pool.inner.state.lock().unwrap().live = 1;

        pool.sweep_once().await;
        assert_eq!(pool.metrics().live, 0);
    }

    #[tokio::test]
    async fn sweep_purge_serving_a_waiter_nets_live_unchanged() {
        // No worker_dirs: the waiter's replacement spawn is guaranteed to
        // fail with AppNotFound, which is exactly the scenario that used to
        // underflow `live` to usize::MAX before the sweep properly
        // re-accounted for a purged worker whose slot goes to a waiter.
        let pool = Pool::new(vec![], 1);
        let app_a = AppIdent::new("hello", "1.0.0");
        let app_b = AppIdent::new("goodbye", "1.0.0");

        let mut idle_worker = Worker::for_test(app_a.clone(), cfg(0, 10, 1000)).await;
        idle_worker.set_last_activity_at_for_test(Instant::now() - Duration::from_millis(50));
        pool.inner
            .state
            .lock()
            .unwrap()
            .lanes
            .entry(app_a.clone())
            .or_default()
            .ready
            .push(idle_worker);
        pool.inner.state.lock().unwrap().live = 1;

        let waiter_pool = pool.clone();
        let waiter_app = app_b.clone();
        let waiter = tokio::spawn(async move {
            waiter_pool.acquire(waiter_app, Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.sweep_once().await;

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(BuntimeError::AppNotFound { .. })));
        // Purged (-1), handed to the waiter (+1), then the replacement
        // spawn failed (-1): nets to 0, never underflowing.
        assert_eq!(pool.metrics().live, 0);
    }
}
