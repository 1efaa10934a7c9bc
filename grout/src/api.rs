//! Request/response types for the external control API (§6).

use crate::error::{Errno, Result};
use crate::port::{Port, PortRegistry};
use crate::queue::{PortId, QueueId};

/// Module id this API's requests are dispatched under.
pub const INFRA: u16 = 0xacdc;

/// Wire shape of a port in API responses (§6: "port carries {index,
/// name[64], device[128], mtu, mac[6]}").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub index: PortId,
    pub name: String,
    pub device: String,
    pub mtu: u32,
    pub mac: [u8; 6],
}

impl From<Port> for PortInfo {
    fn from(port: Port) -> Self {
        Self {
            index: port.port_id,
            name: port.name,
            device: port.devargs,
            mtu: port.mtu,
            mac: port.mac,
        }
    }
}

pub struct PortAddRequest {
    pub name: String,
    pub devargs: String,
}

pub struct PortAddResponse {
    pub port: PortInfo,
}

pub fn port_add<D: crate::driver::Driver>(
    ports: &mut PortRegistry,
    driver: &D,
    req: PortAddRequest,
) -> Result<PortAddResponse> {
    let port = ports.add(&req.name, &req.devargs, driver)?;
    Ok(PortAddResponse {
        port: port.into(),
    })
}

pub struct PortDelRequest {
    pub name: String,
}

pub fn port_del<D: crate::driver::Driver>(
    ports: &mut PortRegistry,
    driver: &D,
    req: PortDelRequest,
) -> Result<()> {
    ports.del(&req.name, driver)
}

pub struct PortGetRequest {
    pub name: String,
}

pub struct PortGetResponse {
    pub port: PortInfo,
}

pub fn port_get(ports: &PortRegistry, req: PortGetRequest) -> Result<PortGetResponse> {
    let port = ports.get_by_name(&req.name)?;
    Ok(PortGetResponse {
        port: port.into(),
    })
}

/// `PORT_LIST {} → { n_ports, ports[<=32] }` — truncated rather than
/// erroring if the registry somehow holds more than the wire limit.
pub const PORT_LIST_MAX: usize = 32;

pub struct PortListResponse {
    pub n_ports: usize,
    pub ports: Vec<PortInfo>,
}

pub fn port_list(ports: &PortRegistry) -> PortListResponse {
    let all = ports.list();
    let n_ports = all.len();
    let ports = all
        .into_iter()
        .take(PORT_LIST_MAX)
        .map(PortInfo::from)
        .collect();
    PortListResponse { n_ports, ports }
}

pub struct RxqSetRequest {
    pub port_id: PortId,
    pub queue_id: QueueId,
    pub cpu_id: u32,
}

/// Returns the errno-compatible surface named in §6: `ENODEV`,
/// `ERANGE`, `EBUSY`, `ENOMEM`, `EIO` map directly from
/// [`crate::assign::rxq_assign`]'s own error type.
pub fn rxq_set<D: crate::driver::Driver>(
    ports: &mut PortRegistry,
    workers: &mut crate::worker::WorkerRegistry,
    driver: &D,
    cfg: &crate::config::RouterConfig,
    req: RxqSetRequest,
) -> Result<()> {
    crate::assign::rxq_assign(
        ports,
        workers,
        driver,
        cfg,
        req.port_id,
        req.queue_id,
        req.cpu_id,
    )
}
