//! Admission gate bounding outbound calls to the platform.
//!
//! Semantics: at most `max_concurrent` tasks in flight at once, and at most
//! `interval_cap` tasks *started* within any rolling window of `interval`.
//! Tasks start in FIFO submission order; completion order is unspecified.
//! The gate never looks at task payloads — a task failure reaches only its
//! own submitter.

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tokio::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    /// The task was dropped by `clear()` before it started.
    #[error("task cleared before it started")]
    Cleared,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Maximum tasks in flight at any instant.
    pub max_concurrent: usize,
    /// Rolling window length for the start cap.
    pub interval: Duration,
    /// Maximum task starts within any rolling window.
    pub interval_cap: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 200,
            interval: Duration::from_millis(1000),
            interval_cap: 200,
        }
    }
}

impl GateConfig {
    /// Both caps set to `qps`, window fixed at one second.
    pub fn with_qps(qps: usize) -> Self {
        Self {
            max_concurrent: qps,
            interval: Duration::from_millis(1000),
            interval_cap: qps,
        }
    }
}

type Task = BoxFuture<'static, ()>;

struct GateState {
    queued: VecDeque<Task>,
    in_flight: usize,
    recent_starts: VecDeque<Instant>,
    paused: bool,
    timer_armed: bool,
}

struct Shared {
    config: GateConfig,
    state: Mutex<GateState>,
    idle: Notify,
}

impl Shared {
    fn locked(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().expect("gate state lock poisoned")
    }
}

#[derive(Clone)]
pub struct AdmissionGate {
    shared: Arc<Shared>,
}

impl AdmissionGate {
    pub fn new(config: GateConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(GateState {
                queued: VecDeque::new(),
                in_flight: 0,
                recent_starts: VecDeque::new(),
                paused: false,
                timer_armed: false,
            }),
            idle: Notify::new(),
        });
        Self { shared }
    }

    /// Enqueue a task. The returned future resolves with the task's output
    /// once it has been admitted and run, or with [`GateError::Cleared`] if
    /// the task was dropped before starting.
    pub fn submit<F, T>(&self, task: F) -> impl Future<Output = Result<T, GateError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: Task = Box::pin(async move {
            // Receiver may have been dropped; the task still ran to completion.
            let _ = tx.send(task.await);
        });
        self.shared.locked().queued.push_back(wrapped);
        dispatch(&self.shared);
        async move { rx.await.map_err(|_| GateError::Cleared) }
    }

    /// Queued (not yet started) task count.
    pub fn size(&self) -> usize {
        self.shared.locked().queued.len()
    }

    /// In-flight task count.
    pub fn pending(&self) -> usize {
        self.shared.locked().in_flight
    }

    /// Stop dequeuing. In-flight tasks are unaffected.
    pub fn pause(&self) {
        self.shared.locked().paused = true;
    }

    /// Resume dequeuing.
    pub fn resume(&self) {
        self.shared.locked().paused = false;
        dispatch(&self.shared);
    }

    /// Drop every queued-not-started task. Their submitters observe
    /// [`GateError::Cleared`].
    pub fn clear(&self) {
        let idle_now = {
            let mut state = self.shared.locked();
            state.queued.clear();
            state.in_flight == 0
        };
        if idle_now {
            self.shared.idle.notify_waiters();
        }
    }

    /// Resolves once both queued and in-flight counts are zero. Resolves
    /// immediately if the gate is already idle.
    pub async fn on_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            {
                let state = self.shared.locked();
                if state.queued.is_empty() && state.in_flight == 0 {
                    return;
                }
            }
            notified.await;
        }
    }
}

/// Releases an in-flight slot when the task finishes, even if it panicked.
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let idle_now = {
            let mut state = self.shared.locked();
            state.in_flight -= 1;
            state.in_flight == 0 && state.queued.is_empty()
        };
        if idle_now {
            self.shared.idle.notify_waiters();
        }
        dispatch(&self.shared);
    }
}

/// Start as many queued tasks as the two caps allow; when blocked only by the
/// rolling window, arm a single wakeup timer for the moment the oldest start
/// ages out.
fn dispatch(shared: &Arc<Shared>) {
    let mut to_start: Vec<Task> = Vec::new();
    let mut wake_at: Option<Instant> = None;
    {
        let mut state = shared.locked();
        let config = &shared.config;
        let now = Instant::now();
        while let Some(oldest) = state.recent_starts.front() {
            if now.duration_since(*oldest) >= config.interval {
                state.recent_starts.pop_front();
            } else {
                break;
            }
        }
        while !state.paused
            && state.in_flight < config.max_concurrent
            && state.recent_starts.len() < config.interval_cap
        {
            let Some(task) = state.queued.pop_front() else {
                break;
            };
            state.in_flight += 1;
            state.recent_starts.push_back(now);
            to_start.push(task);
        }
        if !state.queued.is_empty()
            && !state.paused
            && state.in_flight < config.max_concurrent
            && state.recent_starts.len() >= config.interval_cap
            && !state.timer_armed
        {
            state.timer_armed = true;
            wake_at = state.recent_starts.front().map(|t| *t + config.interval);
        }
    }

    for task in to_start {
        let guard = InFlightGuard {
            shared: Arc::clone(shared),
        };
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    if let Some(at) = wake_at {
        debug!(in_ms = ?(at - Instant::now()), "admission window full; timer armed");
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            shared.locked().timer_armed = false;
            dispatch(&shared);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gate(max_concurrent: usize, interval_ms: u64, interval_cap: usize) -> AdmissionGate {
        AdmissionGate::new(GateConfig {
            max_concurrent,
            interval: Duration::from_millis(interval_ms),
            interval_cap,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_start_in_fifo_order() {
        let gate = gate(1, 1000, 1000);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..4 {
            let order = Arc::clone(&order);
            handles.push(gate.submit(async move {
                order.lock().unwrap().push(i);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_limit() {
        let gate = gate(2, 1000, 1000);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(gate.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rolling_window_throttles_drain() {
        // N=2, W=1000ms, 5 tasks of 100ms each: starts at 0, 0, 1000, 1000,
        // 2000 — total drain time must be at least 2000ms.
        let gate = gate(2, 1000, 2);
        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..5 {
            handles.push(gate.submit(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn on_idle_resolves_immediately_when_idle() {
        let gate = gate(2, 1000, 2);
        gate.on_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn on_idle_waits_for_drain() {
        let gate = gate(1, 1000, 1000);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = Arc::clone(&done);
            // Result futures deliberately dropped; the tasks still run.
            drop(gate.submit(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        gate.on_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(gate.size(), 0);
        assert_eq!(gate.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_queued_tasks_only() {
        let gate = gate(1, 1000, 1000);
        let first = gate.submit(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            "ran"
        });
        // Let the first task start before queuing the victim.
        tokio::time::sleep(Duration::from_millis(1)).await;
        let second = gate.submit(async { "never" });
        assert_eq!(gate.size(), 1);
        gate.clear();
        assert_eq!(second.await, Err(GateError::Cleared));
        assert_eq!(first.await, Ok("ran"));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_dequeue_and_resume_restarts() {
        let gate = gate(1, 1000, 1000);
        gate.pause();
        let handle = gate.submit(async { 7 });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(gate.size(), 1);
        assert_eq!(gate.pending(), 0);
        gate.resume();
        assert_eq!(handle.await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn task_panics_do_not_poison_siblings() {
        let gate = gate(2, 1000, 1000);
        let bad = gate.submit(async {
            panic!("task blew up");
        });
        let good = gate.submit(async { 42 });
        assert_eq!(bad.await, Err(GateError::Cleared));
        assert_eq!(good.await, Ok(42));
    }
}
