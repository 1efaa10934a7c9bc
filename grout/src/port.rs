//! Port registry (C1, §4.1): tracks physical ports and their queue
//! counts. Mutated only by the control plane.

use std::collections::HashMap;

use crate::driver::Driver;
use crate::error::{Errno, Result};
use crate::queue::PortId;

/// A registered physical/virtual port.
#[derive(Debug, Clone)]
pub struct Port {
    pub port_id: PortId,
    pub name: String,
    pub devargs: String,
    pub n_rxq: u16,
    pub n_txq: u16,
    pub mtu: u32,
    pub mac: [u8; 6],
}

/// Flat arena of ports keyed by name and by id (§9: "Registries as
/// arenas keyed by small integer ids; never store back-pointers").
#[derive(Default)]
pub struct PortRegistry {
    ports: HashMap<PortId, Port>,
    next_id: PortId,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new port with zero TX queues (the assignment engine
    /// grows `n_txq` lazily as workers are created). RX queue count,
    /// MTU, and MAC address are discovered from the driver (§4.8), which
    /// then provisions a mempool and every discovered RX queue and
    /// starts the device. TX queues aren't set up here since none exist
    /// until the first worker is assigned to this port (§4.3 step 2
    /// reconfigures the device when that happens).
    pub fn add<D: Driver>(&mut self, name: &str, devargs: &str, driver: &D) -> Result<Port> {
        if self.ports.values().any(|p| p.name == name) {
            return Err(Errno::EINVAL.into());
        }
        let port_id = self.next_id;
        let info = driver.eth_dev_info_get(port_id)?;
        driver.pktmbuf_pool_create(&format!("{name}_pool"))?;
        for queue_id in 0..info.n_rxq {
            driver.eth_rx_queue_setup(port_id, queue_id)?;
        }
        driver.eth_dev_start(port_id)?;
        self.next_id += 1;
        let port = Port {
            port_id,
            name: name.to_string(),
            devargs: devargs.to_string(),
            n_rxq: info.n_rxq,
            n_txq: 0,
            mtu: info.mtu,
            mac: info.mac,
        };
        self.ports.insert(port_id, port.clone());
        Ok(port)
    }

    /// Stop the device and drop the port (§4.1 "del").
    pub fn del<D: Driver>(&mut self, name: &str, driver: &D) -> Result<()> {
        let port_id = self.find_id_by_name(name)?;
        driver.eth_dev_stop(port_id)?;
        self.ports.remove(&port_id);
        Ok(())
    }

    pub fn get_by_name(&self, name: &str) -> Result<Port> {
        self.ports
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| Errno::ENODEV.into())
    }

    pub fn get(&self, port_id: PortId) -> Result<&Port> {
        self.ports.get(&port_id).ok_or_else(|| Errno::ENODEV.into())
    }

    pub fn get_mut(&mut self, port_id: PortId) -> Result<&mut Port> {
        self.ports
            .get_mut(&port_id)
            .ok_or_else(|| Errno::ENODEV.into())
    }

    pub fn list(&self) -> Vec<Port> {
        let mut ports: Vec<Port> = self.ports.values().cloned().collect();
        ports.sort_by_key(|p| p.port_id);
        ports
    }

    pub fn ids(&self) -> Vec<PortId> {
        let mut ids: Vec<PortId> = self.ports.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Grow every known port's `n_txq` to `count` (§4.3 step 2, "extend
    /// every port's n_txq by one").
    pub fn set_txq_count_all(&mut self, count: u16) {
        for port in self.ports.values_mut() {
            port.n_txq = count;
        }
    }

    fn find_id_by_name(&self, name: &str) -> Result<PortId> {
        self.ports
            .values()
            .find(|p| p.name == name)
            .map(|p| p.port_id)
            .ok_or_else(|| Errno::ENODEV.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StubDriver;

    #[test]
    fn add_assigns_distinct_ids() {
        let mut reg = PortRegistry::new();
        let driver = StubDriver::new();
        let p0 = reg.add("p0", "", &driver).unwrap();
        let p1 = reg.add("p1", "", &driver).unwrap();
        assert_ne!(p0.port_id, p1.port_id);
        assert_eq!(p0.n_rxq, 1);
        assert_eq!(p0.n_txq, 0);
    }

    #[test]
    fn add_discovers_queue_count_and_mac_from_the_driver() {
        let mut reg = PortRegistry::new();
        let driver = StubDriver::new();
        driver.set_dev_info(
            0,
            crate::driver::DeviceInfo {
                n_rxq: 4,
                mtu: 9000,
                mac: [0xaa, 0, 0, 0, 0, 1],
            },
        );
        let p0 = reg.add("p0", "", &driver).unwrap();
        assert_eq!(p0.n_rxq, 4);
        assert_eq!(p0.mtu, 9000);
        assert_eq!(p0.mac, [0xaa, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn add_provisions_a_pool_and_every_rx_queue_then_starts_the_device() {
        use crate::driver::StubCall;

        let mut reg = PortRegistry::new();
        let driver = StubDriver::new();
        driver.set_dev_info(
            0,
            crate::driver::DeviceInfo {
                n_rxq: 2,
                mtu: 1500,
                mac: [0; 6],
            },
        );
        reg.add("p0", "", &driver).unwrap();

        let calls = driver.calls();
        assert!(calls.contains(&(StubCall::DevInfoGet, 0)));
        assert!(calls.contains(&(StubCall::PoolCreate, 0)));
        assert_eq!(
            calls.iter().filter(|c| c.0 == StubCall::RxQueueSetup).count(),
            2
        );
        assert!(calls.contains(&(StubCall::Start, 0)));
    }

    #[test]
    fn del_stops_the_device() {
        use crate::driver::StubCall;

        let mut reg = PortRegistry::new();
        let driver = StubDriver::new();
        reg.add("p0", "", &driver).unwrap();
        reg.del("p0", &driver).unwrap();
        assert!(driver.calls().contains(&(StubCall::Stop, 0)));
    }

    #[test]
    fn add_duplicate_name_rejected() {
        let mut reg = PortRegistry::new();
        let driver = StubDriver::new();
        reg.add("p0", "", &driver).unwrap();
        let err = reg.add("p0", "", &driver).unwrap_err();
        assert_eq!(err.errno, Errno::EINVAL);
    }

    #[test]
    fn get_unknown_port_is_enodev() {
        let reg = PortRegistry::new();
        let err = reg.get(0).unwrap_err();
        assert_eq!(err.errno, Errno::ENODEV);
    }

    #[test]
    fn set_txq_count_all_applies_to_every_port() {
        let mut reg = PortRegistry::new();
        let driver = StubDriver::new();
        reg.add("p0", "", &driver).unwrap();
        reg.add("p1", "", &driver).unwrap();
        reg.set_txq_count_all(2);
        for port in reg.list() {
            assert_eq!(port.n_txq, 2);
        }
    }
}
