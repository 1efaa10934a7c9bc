//! Abstraction over the NIC control-path calls the port registry and
//! assignment engine need (§6, "Driver interface consumed"), so both
//! can be tested without linking DPDK.
//!
//! `DpdkDriver` adapts the real `dpdk-net` ethdev wrappers. `StubDriver`
//! is an in-memory fake mirroring the `__wrap_*` mocks the worker
//! assignment tests in the source implementation are built on: it
//! records every call and can be told to fail a specific call with a
//! chosen `Errno`, to exercise the engine's rollback path (§4.3, §7).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use dpdk_net::api::rte::eth::{EthConf, EthDev, RxQueueConf, TxQueueConf};
use dpdk_net::api::rte::pktmbuf::{MemPool, MemPoolConfig};

use crate::error::{Errno, Result};
use crate::queue::{PortId, QueueId};

/// Device capabilities discovered at port-registration time (§4.8):
/// `rte_eth_dev_info_get` for queue counts and MTU bounds,
/// `rte_eth_macaddr_get` for the station address.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceInfo {
    pub n_rxq: u16,
    pub mtu: u32,
    pub mac: [u8; 6],
}

/// Control-path operations the assignment engine performs against a
/// port. Mirrors §6's "Driver interface consumed" plus TX burst-send.
pub trait Driver: Send + Sync {
    /// Discover a newly registered port's queue capacity, MTU, and MAC
    /// address (§4.8 "port registration discovers real queue counts via
    /// the driver").
    fn eth_dev_info_get(&self, port_id: PortId) -> Result<DeviceInfo>;
    fn eth_dev_configure(&self, port_id: PortId, nb_rxq: u16, nb_txq: u16) -> Result<()>;
    fn eth_rx_queue_setup(&self, port_id: PortId, queue_id: QueueId) -> Result<()>;
    fn eth_tx_queue_setup(&self, port_id: PortId, queue_id: QueueId) -> Result<()>;
    fn eth_dev_start(&self, port_id: PortId) -> Result<()>;
    fn eth_dev_stop(&self, port_id: PortId) -> Result<()>;
    fn pktmbuf_pool_create(&self, name: &str) -> Result<()>;
    /// Send `packets.len()` packets on `(port_id, queue_id)`, returning
    /// how many the driver accepted.
    fn eth_tx_burst(&self, port_id: PortId, queue_id: QueueId, packets: &[Vec<u8>]) -> usize;
}

/// Production driver: a thin adapter over `dpdk-net`'s `EthDev`/`MemPool`.
pub struct DpdkDriver {
    mempool: MemPool,
}

impl DpdkDriver {
    pub fn new(mempool: MemPool) -> Self {
        Self { mempool }
    }
}

impl Driver for DpdkDriver {
    /// The `max_rx_queues`/`max_mtu` fields are the driver's theoretical
    /// maximum, which may exceed actual hardware capability on some
    /// NICs (see `EthDev::info`'s own doc comment) — good enough for
    /// populating a newly registered port's defaults.
    fn eth_dev_info_get(&self, port_id: PortId) -> Result<DeviceInfo> {
        let dev = EthDev::new(port_id);
        let info = dev.info().map_err(Into::into)?;
        let mac = dev.mac_addr().map_err(Into::into)?;
        Ok(DeviceInfo {
            n_rxq: info.max_rx_queues,
            mtu: info.max_mtu as u32,
            mac: mac.addr_bytes,
        })
    }

    fn eth_dev_configure(&self, port_id: PortId, nb_rxq: u16, nb_txq: u16) -> Result<()> {
        EthDev::new(port_id)
            .configure(nb_rxq, nb_txq, &EthConf::new())
            .map_err(Into::into)
    }

    fn eth_rx_queue_setup(&self, port_id: PortId, queue_id: QueueId) -> Result<()> {
        EthDev::new(port_id)
            .rx_queue_setup(queue_id, &self.mempool, &RxQueueConf::new())
            .map_err(Into::into)
    }

    fn eth_tx_queue_setup(&self, port_id: PortId, queue_id: QueueId) -> Result<()> {
        EthDev::new(port_id)
            .tx_queue_setup(queue_id, &TxQueueConf::new())
            .map_err(Into::into)
    }

    fn eth_dev_start(&self, port_id: PortId) -> Result<()> {
        EthDev::new(port_id).start().map_err(Into::into)
    }

    fn eth_dev_stop(&self, port_id: PortId) -> Result<()> {
        EthDev::new(port_id).stop().map_err(Into::into)
    }

    fn pktmbuf_pool_create(&self, name: &str) -> Result<()> {
        MemPool::create_default(name.to_string(), MemPoolConfig::default().num_mbufs)
            .map(|_| ())
            .map_err(Into::into)
    }

    fn eth_tx_burst(&self, _port_id: PortId, _queue_id: QueueId, packets: &[Vec<u8>]) -> usize {
        // Real burst send goes through `dpdk-net`'s mbuf/queue wrappers;
        // out of scope here (§1 — "mempool/NIC driver abstractions").
        packets.len()
    }
}

/// One call the stub is told to fail, and with what error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubCall {
    DevInfoGet,
    Configure,
    RxQueueSetup,
    TxQueueSetup,
    Start,
    Stop,
    PoolCreate,
}

#[derive(Default)]
struct StubState {
    calls: Vec<(StubCall, PortId)>,
    fail_after: Option<(StubCall, u32, Errno)>,
    call_counts: HashMap<StubCall, u32>,
    pools: HashSet<String>,
    tx_limit: Option<usize>,
    dev_info: HashMap<PortId, DeviceInfo>,
}

/// In-memory driver used by tests. Records every call it receives and
/// can be configured to fail the Nth occurrence of a given call.
pub struct StubDriver {
    state: Mutex<StubState>,
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StubDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState::default()),
        }
    }

    /// Fail the `n`th (1-indexed) occurrence of `call` with `errno`.
    pub fn fail_nth(&self, call: StubCall, n: u32, errno: Errno) {
        self.state.lock().unwrap().fail_after = Some((call, n, errno));
    }

    pub fn calls(&self) -> Vec<(StubCall, PortId)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Cap how many packets `eth_tx_burst` reports as accepted, to
    /// exercise the TX node's overflow path (§4.7).
    pub fn set_tx_limit(&self, limit: usize) {
        self.state.lock().unwrap().tx_limit = Some(limit);
    }

    /// Configure what `eth_dev_info_get` reports for `port_id`, so tests
    /// can register ports with a chosen queue count instead of the
    /// single-queue fallback (§4.8).
    pub fn set_dev_info(&self, port_id: PortId, info: DeviceInfo) {
        self.state.lock().unwrap().dev_info.insert(port_id, info);
    }

    fn record(&self, call: StubCall, port_id: PortId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((call, port_id));
        let count = state.call_counts.entry(call).or_insert(0);
        *count += 1;
        let count = *count;
        if let Some((failing_call, n, errno)) = state.fail_after {
            if failing_call == call && count == n {
                return Err(errno.into());
            }
        }
        Ok(())
    }
}

impl Driver for StubDriver {
    fn eth_dev_info_get(&self, port_id: PortId) -> Result<DeviceInfo> {
        self.record(StubCall::DevInfoGet, port_id)?;
        let state = self.state.lock().unwrap();
        Ok(state.dev_info.get(&port_id).copied().unwrap_or(DeviceInfo {
            n_rxq: 1,
            mtu: 1500,
            mac: [0; 6],
        }))
    }

    fn eth_dev_configure(&self, port_id: PortId, _nb_rxq: u16, _nb_txq: u16) -> Result<()> {
        self.record(StubCall::Configure, port_id)
    }

    fn eth_rx_queue_setup(&self, port_id: PortId, _queue_id: QueueId) -> Result<()> {
        self.record(StubCall::RxQueueSetup, port_id)
    }

    fn eth_tx_queue_setup(&self, port_id: PortId, _queue_id: QueueId) -> Result<()> {
        self.record(StubCall::TxQueueSetup, port_id)
    }

    fn eth_dev_start(&self, port_id: PortId) -> Result<()> {
        self.record(StubCall::Start, port_id)
    }

    fn eth_dev_stop(&self, port_id: PortId) -> Result<()> {
        self.record(StubCall::Stop, port_id)
    }

    fn pktmbuf_pool_create(&self, name: &str) -> Result<()> {
        self.record(StubCall::PoolCreate, 0)?;
        self.state.lock().unwrap().pools.insert(name.to_string());
        Ok(())
    }

    fn eth_tx_burst(&self, _port_id: PortId, _queue_id: QueueId, packets: &[Vec<u8>]) -> usize {
        match self.state.lock().unwrap().tx_limit {
            Some(limit) => packets.len().min(limit),
            None => packets.len(),
        }
    }
}
