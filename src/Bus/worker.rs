// Worker pool: core-pinned threads draining disjoint queue partitions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use super::component::{Component, ComponentId};
use super::kernel::Kernel;
use super::publisher::{Publisher, QueueSet};
use super::subscription::SubscriptionTable;
use super::Structs::Message;
use super::Queue::SpscQueue;
use crate::error::{KernelError, PublishError};
use crate::Core::affinity;
use crate::Core::dylib::RetainedLibrary;

/// What the workers do with queued messages when asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Keep draining owned queues until they are empty, then exit.
    Drain,
    /// Exit after the current pass; queued messages are left behind.
    Immediate,
}

/// Per-worker counters returned when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: usize,
    /// Core the worker was pinned to, if pinning succeeded.
    pub core: Option<usize>,
    /// Queues this worker was the consumer of.
    pub queues: usize,
    /// Messages popped.
    pub messages: u64,
    /// Handler invocations.
    pub dispatched: u64,
}

/// Immutable snapshot shared by all workers once the kernel is running.
struct Dispatch {
    components: Box<[Box<dyn Component>]>,
    subscriptions: SubscriptionTable,
    queues: Arc<QueueSet>,
}

/// Flags shared between the pool and its controller.
struct Control {
    /// Cleared by a stop request.
    running: AtomicBool,
    /// Cleared only by the controller, after `drain` is set.
    active: AtomicBool,
    drain: AtomicBool,
}

/// Clears the running flag from anywhere, e.g. a signal handler.
#[derive(Clone)]
pub struct StopHandle {
    control: Arc<Control>,
}

impl StopHandle {
    /// Clear the running flag. Safe to call from a signal handler.
    pub fn stop(&self) {
        self.control.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::Acquire)
    }
}

/// A started kernel: frozen tables plus the worker pool.
pub struct RunningKernel {
    dispatch: Arc<Dispatch>,
    control: Arc<Control>,
    workers: Vec<JoinHandle<WorkerStats>>,
    stopped: bool,
    libraries: Vec<RetainedLibrary>,
}

impl Kernel {
    /// Freeze registration and spawn the worker pool.
    ///
    /// Worker `w` is pinned to the `w`-th available core and is the only
    /// consumer of queues whose index `i` satisfies `i % workers == w`.
    pub fn start(self) -> Result<RunningKernel, KernelError> {
        let workers = self.settings.workers;
        if workers == 0 {
            return Err(KernelError::NoWorkers);
        }
        let cores = affinity::allowed_cores();
        if workers > cores.len() {
            return Err(KernelError::TooManyWorkers {
                requested: workers,
                available: cores.len(),
            });
        }

        let Kernel {
            queues,
            components,
            subscriptions,
            libraries,
            ..
        } = self;

        let dispatch = Arc::new(Dispatch {
            components: components.into_boxed_slice(),
            subscriptions,
            queues,
        });
        let control = Arc::new(Control {
            running: AtomicBool::new(true),
            active: AtomicBool::new(true),
            drain: AtomicBool::new(false),
        });

        let mut running = RunningKernel {
            dispatch,
            control,
            workers: Vec::with_capacity(workers),
            stopped: false,
            libraries,
        };

        for (worker, &core) in cores.iter().take(workers).enumerate() {
            let dispatch = Arc::clone(&running.dispatch);
            let control = Arc::clone(&running.control);
            let spawned = thread::Builder::new()
                .name(format!("bus-worker-{worker}"))
                .spawn(move || worker_loop(worker, workers, core, &dispatch, &control));

            match spawned {
                Ok(handle) => running.workers.push(handle),
                Err(source) => {
                    // Dropping `running` stops and joins the workers already spawned
                    return Err(KernelError::Spawn { worker, source });
                }
            }
        }

        info!(
            workers,
            components = running.dispatch.components.len(),
            subscribed_types = running.dispatch.subscriptions.type_count(),
            "kernel started"
        );
        Ok(running)
    }
}

impl RunningKernel {
    #[inline]
    pub fn publish(&self, sender_id: ComponentId, msg: Message) -> Result<(), PublishError> {
        self.dispatch.queues.publish(sender_id, msg)
    }

    pub fn publisher(&self, id: ComponentId) -> Option<Publisher> {
        self.dispatch
            .queues
            .get(id)
            .map(|_| Publisher::new(id, Arc::clone(&self.dispatch.queues)))
    }

    pub fn component_count(&self) -> usize {
        self.dispatch.components.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.dispatch.subscriptions
    }

    pub fn libraries(&self) -> &[RetainedLibrary] {
        &self.libraries
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::Acquire)
    }

    /// Stop the pool, join every worker, then call each component's `stop`.
    pub fn shutdown(mut self, mode: ShutdownMode) -> Vec<WorkerStats> {
        self.stop_workers(mode)
    }

    /// Block until the running flag is cleared by a [`StopHandle`], then
    /// shut down in `mode`.
    pub fn wait(mut self, mode: ShutdownMode) -> Vec<WorkerStats> {
        while self.is_running() {
            thread::park_timeout(std::time::Duration::from_millis(50));
        }
        self.stop_workers(mode)
    }

    fn stop_workers(&mut self, mode: ShutdownMode) -> Vec<WorkerStats> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;

        self.control
            .drain
            .store(mode == ShutdownMode::Drain, Ordering::Release);
        self.control.active.store(false, Ordering::Release);
        self.control.running.store(false, Ordering::Release);

        let workers = self.workers.len();
        let mut stats = Vec::with_capacity(workers);
        for handle in self.workers.drain(..) {
            match handle.join() {
                Ok(s) => stats.push(s),
                Err(_) => error!("worker thread panicked"),
            }
        }

        if mode == ShutdownMode::Drain {
            let late = drain_after_join(&self.dispatch, workers, &mut stats);
            if late > 0 {
                debug!(messages = late, "drained messages published after their worker exited");
            }
        }

        for component in self.dispatch.components.iter() {
            component.stop();
        }

        let messages: u64 = stats.iter().map(|s| s.messages).sum();
        info!(?mode, workers = stats.len(), messages, "kernel stopped");
        stats
    }
}

impl Drop for RunningKernel {
    fn drop(&mut self) {
        self.stop_workers(ShutdownMode::Immediate);
    }
}

fn worker_loop(
    worker: usize,
    workers: usize,
    core: usize,
    dispatch: &Dispatch,
    control: &Control,
) -> WorkerStats {
    let mut stats = WorkerStats {
        worker,
        ..WorkerStats::default()
    };

    match affinity::pin_current_thread(core) {
        Ok(()) => stats.core = Some(core),
        Err(e) => warn!(worker, core, error = %e, "failed to pin worker, running unpinned"),
    }

    let owned = owned_queues(dispatch, worker, workers);
    stats.queues = owned.len();
    debug!(worker, core, queues = owned.len(), "worker started");

    while control.active.load(Ordering::Acquire) {
        drain_pass(&owned, dispatch, &mut stats);
        thread::yield_now();
    }

    if control.drain.load(Ordering::Acquire) {
        while drain_pass(&owned, dispatch, &mut stats) > 0 {}
    }

    debug!(worker, messages = stats.messages, "worker exiting");
    stats
}

/// Queues consumed by `worker`: a disjoint partition of the queue set.
fn owned_queues(dispatch: &Dispatch, worker: usize, workers: usize) -> Vec<&SpscQueue> {
    (worker..dispatch.queues.len())
        .step_by(workers)
        .filter_map(|index| dispatch.queues.queue(index))
        .collect()
}

/// Final drain on the controller once every worker has been joined, so it is
/// the only consumer left. Catches messages a handler published into a queue
/// whose worker had already finished draining. Counts go to the owning
/// worker's stats. Returns the number of messages popped.
fn drain_after_join(dispatch: &Dispatch, workers: usize, stats: &mut [WorkerStats]) -> u64 {
    if workers == 0 {
        return 0;
    }
    let partitions: Vec<Vec<&SpscQueue>> = (0..workers)
        .map(|worker| owned_queues(dispatch, worker, workers))
        .collect();
    let mut orphan = WorkerStats::default();
    let mut total = 0;
    loop {
        let mut popped = 0;
        for (worker, owned) in partitions.iter().enumerate() {
            let entry = match stats.iter_mut().find(|s| s.worker == worker) {
                Some(entry) => entry,
                None => &mut orphan,
            };
            popped += drain_pass(owned, dispatch, entry);
        }
        if popped == 0 {
            return total;
        }
        total += popped;
    }
}

/// Drain every owned queue once, dispatching each message. Returns the
/// number of messages popped.
#[inline]
fn drain_pass(owned: &[&SpscQueue], dispatch: &Dispatch, stats: &mut WorkerStats) -> u64 {
    let mut popped = 0;
    for queue in owned {
        // Safety: queues are partitioned, and the controller only drains
        // them after every worker has been joined.
        while let Some(msg) = unsafe { queue.pop() } {
            popped += 1;
            stats.dispatched += dispatch
                .subscriptions
                .dispatch(&dispatch.components, &msg) as u64;
        }
    }
    stats.messages += popped;
    popped
}
