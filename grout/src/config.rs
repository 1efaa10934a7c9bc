//! Process-wide constants the assignment engine treats as environment
//! facts: which CPUs a worker may be pinned to, which one is reserved
//! for the control plane, and the datapath limits from §4.6/§4.7.

use nix::sched::CpuSet;
use nix::unistd::Pid;

/// Default bound on a next-hop's held-packet queue (§4.6).
pub const DEFAULT_HOLD_MAX: usize = 256;

/// Default size of the per-interface-type tunnel override table (§4.6,
/// §9 open question).
pub const DEFAULT_TUNNEL_TABLE_SIZE: usize = 128;

/// Process-wide router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// CPUs the process is allowed to pin workers to.
    pub cpu_allowance: Vec<u32>,
    /// The CPU running the control thread; never a worker.
    pub main_cpu: u32,
    /// Bound on a next-hop's held-packet queue.
    pub hold_max: usize,
    /// Size of the per-interface-type tunnel override table.
    pub tunnel_table_size: usize,
}

impl RouterConfig {
    /// Derive the CPU allowance set from this process's affinity mask
    /// (`sched_getaffinity` on pid 0), and pin `main_cpu` as the control
    /// CPU.
    pub fn from_process_affinity(main_cpu: u32) -> Result<Self, nix::errno::Errno> {
        let cpuset = nix::sched::sched_getaffinity(Pid::from_raw(0))?;
        let cpu_allowance = (0..CpuSet::count())
            .filter(|&cpu| cpuset.is_set(cpu).unwrap_or(false))
            .map(|cpu| cpu as u32)
            .collect();
        Ok(Self {
            cpu_allowance,
            main_cpu,
            hold_max: DEFAULT_HOLD_MAX,
            tunnel_table_size: DEFAULT_TUNNEL_TABLE_SIZE,
        })
    }

    /// Build a config from an explicit allowance set, bypassing
    /// `sched_getaffinity` — used by tests that want a deterministic CPU
    /// list regardless of the machine they run on.
    pub fn with_allowance(main_cpu: u32, cpu_allowance: Vec<u32>) -> Self {
        Self {
            cpu_allowance,
            main_cpu,
            hold_max: DEFAULT_HOLD_MAX,
            tunnel_table_size: DEFAULT_TUNNEL_TABLE_SIZE,
        }
    }

    pub fn is_allowed(&self, cpu_id: u32) -> bool {
        self.cpu_allowance.contains(&cpu_id)
    }

    pub fn is_main_cpu(&self, cpu_id: u32) -> bool {
        cpu_id == self.main_cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_allowance_respects_main_cpu() {
        let cfg = RouterConfig::with_allowance(4, vec![1, 2, 3]);
        assert!(cfg.is_allowed(1));
        assert!(!cfg.is_allowed(4));
        assert!(cfg.is_main_cpu(4));
        assert!(!cfg.is_main_cpu(1));
    }
}
