//! Worker registry & lifecycle (C2, §4.2) and the control/data sync
//! protocol (C4, §4.4).

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};
use std::thread::JoinHandle;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use nix::sched::CpuSet;
use nix::unistd::Pid;

use crate::config::RouterConfig;
use crate::error::{Errno, Result};
use crate::graph::Graph;
use crate::queue::QueueMap;

/// The two things a worker needs from a config handoff: which graph to
/// run, and how long it may sleep when the graph is idle.
#[derive(Clone, Default)]
pub struct GraphConfig {
    pub graph: Option<Arc<Graph>>,
    pub max_sleep_us: u32,
}

/// Double-buffered, lock-free config hand-off (§4.4).
///
/// One writer (the control plane, via [`publish`](Self::publish)), one
/// reader (the owning worker thread, via [`pickup`](Self::pickup)). The
/// writer always targets the slot the reader is *not* currently parked
/// on, which holds as long as the control plane waits for
/// `cur_config == next_config` before publishing again — the "at most
/// one in-flight config change per worker" guarantee the protocol
/// relies on.
pub struct ConfigSlots {
    slots: [UnsafeCell<GraphConfig>; 2],
    next_config: AtomicU64,
    cur_config: AtomicU64,
}

// SAFETY: `publish` (the sole writer) only ever touches slot
// `(next_config + 1) & 1`, and the sole reader only ever touches slot
// `next_config & 1` as of its last acquire-load — two different slots
// as long as no second publish lands before the reader's pickup, which
// is the "at most one in-flight config change" invariant the protocol
// requires of its caller. The release-store/acquire-load pair on
// `next_config` establishes happens-before between a slot write and the
// matching read.
unsafe impl Sync for ConfigSlots {}

impl Default for ConfigSlots {
    fn default() -> Self {
        Self {
            slots: [
                UnsafeCell::new(GraphConfig::default()),
                UnsafeCell::new(GraphConfig::default()),
            ],
            next_config: AtomicU64::new(0),
            cur_config: AtomicU64::new(0),
        }
    }
}

impl ConfigSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new config (§4.4 "Publish (control)"). Call from the
    /// control plane only.
    pub fn publish(&self, config: GraphConfig) {
        let next = self.next_config.load(Ordering::Relaxed);
        let slot = ((next + 1) & 1) as usize;
        // SAFETY: single writer; this slot is not the one the reader is
        // currently parked on (see the `Sync` impl above).
        unsafe {
            *self.slots[slot].get() = config;
        }
        fence(Ordering::Release);
        self.next_config.store(next + 1, Ordering::Release);
    }

    /// Pick up a pending config, if any (§4.4 "Pickup (data)"). Call
    /// from the owning worker thread only, between bursts.
    pub fn pickup(&self) -> Option<GraphConfig> {
        let next = self.next_config.load(Ordering::Acquire);
        let cur = self.cur_config.load(Ordering::Relaxed);
        if next == cur {
            return None;
        }
        fence(Ordering::Acquire);
        let slot = (next & 1) as usize;
        // SAFETY: single reader; the control plane will not overwrite
        // this slot again until it observes `cur_config == next_config`.
        let config = unsafe { (*self.slots[slot].get()).clone() };
        self.cur_config.store(next, Ordering::Relaxed);
        Some(config)
    }

    pub fn next_config(&self) -> u64 {
        self.next_config.load(Ordering::Acquire)
    }

    pub fn cur_config(&self) -> u64 {
        self.cur_config.load(Ordering::Acquire)
    }
}

/// Immutable per-cycle stats snapshot a worker publishes (§4.4 "Stats").
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub drops: u64,
}

struct WorkerThread {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

/// A CPU-pinned worker thread that polls a set of RX queues and runs a
/// packet graph (§3 "Worker").
pub struct Worker {
    pub cpu_id: u32,
    pub lcore_id: Option<u32>,
    pub tid: Option<i32>,
    pub rxqs: Vec<QueueMap>,
    pub txqs: Vec<QueueMap>,
    pub started: Arc<AtomicBool>,
    pub config: Arc<ConfigSlots>,
    pub stats: Arc<ArcSwapOption<WorkerStats>>,
    pub stats_reset: Arc<AtomicBool>,
    thread: Option<WorkerThread>,
}

impl Worker {
    fn spawn(cpu_id: u32) -> Result<(Arc<AtomicBool>, Arc<ConfigSlots>, WorkerThread)> {
        let started = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let config = Arc::new(ConfigSlots::new());

        let started_t = started.clone();
        let shutdown_t = shutdown.clone();
        let config_t = config.clone();

        let handle = std::thread::Builder::new()
            .name(format!("grout-worker-{cpu_id}"))
            .spawn(move || worker_loop(cpu_id, started_t, shutdown_t, config_t))
            .map_err(|_| Errno::ENOMEM)?;

        Ok((
            started,
            config,
            WorkerThread {
                handle,
                shutdown,
            },
        ))
    }

    pub fn cpu_id(&self) -> u32 {
        self.cpu_id
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn request_shutdown(&self) {
        if let Some(t) = &self.thread {
            t.shutdown.store(true, Ordering::Release);
        }
    }

    fn join(&mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.handle.join();
        }
    }
}

fn worker_loop(
    cpu_id: u32,
    started: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    config: Arc<ConfigSlots>,
) {
    if let Err(errno) = pin_current_thread(cpu_id) {
        tracing::warn!(cpu_id, %errno, "failed to pin worker thread to cpu");
    }

    let mut current: Option<Arc<Graph>> = None;
    let mut sleep_us: u32 = 0;
    started.store(true, Ordering::Release);

    while !shutdown.load(Ordering::Acquire) {
        if let Some(cfg) = config.pickup() {
            current = cfg.graph;
            sleep_us = cfg.max_sleep_us;
        }

        let produced = match &current {
            Some(graph) => graph.run_once(),
            None => 0,
        };

        if produced == 0 && sleep_us > 0 {
            std::thread::sleep(Duration::from_micros(sleep_us as u64));
        }
    }
}

fn pin_current_thread(cpu_id: u32) -> std::result::Result<(), nix::errno::Errno> {
    let mut cpuset = CpuSet::new();
    cpuset.set(cpu_id as usize)?;
    nix::sched::sched_setaffinity(Pid::from_raw(0), &cpuset)
}

/// Process-wide worker list (§9 "Process-wide tables"): created and
/// torn down by the control plane only.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<Worker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.iter_mut()
    }

    pub fn find_by_cpu(&self, cpu_id: u32) -> Option<usize> {
        self.workers.iter().position(|w| w.cpu_id == cpu_id)
    }

    /// Find the worker currently owning `(port_id, queue_id)` in its
    /// `rxqs`, if any.
    pub fn find_owner(&self, port_id: u16, queue_id: u16) -> Option<usize> {
        self.workers.iter().position(|w| {
            w.rxqs
                .iter()
                .any(|q| q.port_id == port_id && q.queue_id == queue_id)
        })
    }

    pub fn get(&self, index: usize) -> &Worker {
        &self.workers[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Worker {
        &mut self.workers[index]
    }

    /// `worker_create` (§4.2): validates CPU allowance/main-CPU, spawns
    /// a pinned thread, and appends the new worker to the end of the
    /// list (§4.3: "appended to the end ... so existing workers keep
    /// their TX queue ids").
    pub fn create(&mut self, cpu_id: u32, cfg: &RouterConfig) -> Result<usize> {
        if cfg.is_main_cpu(cpu_id) {
            return Err(Errno::EBUSY.into());
        }
        if !cfg.is_allowed(cpu_id) {
            return Err(Errno::ERANGE.into());
        }
        if self.find_by_cpu(cpu_id).is_some() {
            return Err(Errno::EINVAL.into());
        }

        let (started, config, thread) = Worker::spawn(cpu_id)?;
        self.workers.push(Worker {
            cpu_id,
            lcore_id: None,
            tid: None,
            rxqs: Vec::new(),
            txqs: Vec::new(),
            started,
            config,
            stats: Arc::new(ArcSwapOption::empty()),
            stats_reset: Arc::new(AtomicBool::new(false)),
            thread: Some(thread),
        });
        tracing::debug!(cpu_id, "worker created");
        Ok(self.workers.len() - 1)
    }

    /// `worker_destroy` (§4.2): request shutdown, join the thread, drop
    /// the slot.
    pub fn destroy(&mut self, index: usize) {
        let mut worker = self.workers.remove(index);
        worker.request_shutdown();
        worker.join();
        tracing::debug!(cpu_id = worker.cpu_id, "worker destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_slots_start_equal() {
        let slots = ConfigSlots::new();
        assert_eq!(slots.cur_config(), slots.next_config());
        assert!(slots.pickup().is_none());
    }

    #[test]
    fn publish_then_pickup_advances_cur_config() {
        let slots = ConfigSlots::new();
        slots.publish(GraphConfig {
            graph: None,
            max_sleep_us: 50,
        });
        assert_eq!(slots.next_config(), 1);
        assert_eq!(slots.cur_config(), 0);

        let picked = slots.pickup().expect("a config should be pending");
        assert_eq!(picked.max_sleep_us, 50);
        assert_eq!(slots.cur_config(), slots.next_config());
        assert!(slots.pickup().is_none());
    }

    #[test]
    fn create_rejects_main_cpu_and_out_of_range_cpu() {
        let cfg = RouterConfig::with_allowance(4, vec![1, 2, 3]);
        let mut reg = WorkerRegistry::new();
        assert_eq!(reg.create(4, &cfg).unwrap_err().errno, Errno::EBUSY);
        assert_eq!(reg.create(9999, &cfg).unwrap_err().errno, Errno::ERANGE);
    }
}
