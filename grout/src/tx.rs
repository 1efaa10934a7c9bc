//! TX node (§4.7, contract only): the datapath's terminal node. Groups
//! consecutive packets by port, hands each run to the driver's
//! burst-send, and routes whatever the driver didn't accept to an
//! error edge. Never forwards a successfully sent packet onward — it
//! is freed by the driver call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::Driver;
use crate::graph::{EdgeIndex, Packet, ProcessResult, Sink};
use crate::queue::{PortId, QueueId};

pub const TX_ERROR: EdgeIndex = 0;
pub const NO_PORT: EdgeIndex = 1;
pub const N_EDGES: usize = 2;

/// Per-node context (§4.5 "init allocates ... the TX node's
/// port-to-txq map"), populated by the assignment engine for the
/// worker this graph belongs to. `iface_id` in a packet's eth metadata
/// doubles as its physical port id in this model — there is no
/// separate interface registry in scope here.
pub struct TxNode<D: Driver> {
    driver: Arc<D>,
    txq_map: HashMap<PortId, QueueId>,
}

impl<D: Driver> TxNode<D> {
    pub fn new(driver: Arc<D>, txq_map: HashMap<PortId, QueueId>) -> Self {
        Self { driver, txq_map }
    }

    pub fn process(&self, burst: Vec<Packet>, sink: &mut Sink<'_>) -> ProcessResult {
        let mut result = ProcessResult::default();
        for (port, run) in group_by_port(burst) {
            let Some(port_id) = port else {
                result.dropped += run.len();
                sink.enqueue_bulk(NO_PORT, run);
                continue;
            };
            let Some(&queue_id) = self.txq_map.get(&port_id) else {
                result.dropped += run.len();
                sink.enqueue_bulk(NO_PORT, run);
                continue;
            };

            let frames: Vec<Vec<u8>> = run.iter().map(|p| p.data.clone()).collect();
            let accepted = self
                .driver
                .eth_tx_burst(port_id, queue_id, &frames)
                .min(run.len());
            result.accepted += accepted;

            if accepted < run.len() {
                let overflow: Vec<Packet> = run.into_iter().skip(accepted).collect();
                result.dropped += overflow.len();
                sink.enqueue_bulk(TX_ERROR, overflow);
            }
        }
        result
    }
}

/// Splits a burst into maximal runs of packets sharing the same
/// destination port (§4.7 "groups consecutive packets by port_id").
/// Packets without eth metadata form their own singleton `None` runs.
fn group_by_port(burst: Vec<Packet>) -> Vec<(Option<PortId>, Vec<Packet>)> {
    let mut groups: Vec<(Option<PortId>, Vec<Packet>)> = Vec::new();
    for packet in burst {
        let port = packet.meta.eth.map(|eth| eth.iface_id as PortId);
        match groups.last_mut() {
            Some((last_port, run)) if *last_port == port => run.push(packet),
            _ => groups.push((port, vec![packet])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StubDriver;
    use crate::ip6::output::EthMeta;
    use std::collections::VecDeque;

    fn packet_for_port(port_id: u32) -> Packet {
        let mut packet = Packet::default();
        packet.meta.eth = Some(EthMeta {
            dst_mac: smoltcp::wire::EthernetAddress([0; 6]),
            ethertype: 0x86dd,
            iface_id: port_id,
        });
        packet
    }

    fn run_node(
        node: &TxNode<StubDriver>,
        burst: Vec<Packet>,
    ) -> (ProcessResult, Vec<Packet>, Vec<Packet>) {
        let edges: Vec<Vec<Option<usize>>> = vec![vec![Some(1), Some(2)]];
        let mut queues: Vec<VecDeque<Packet>> = vec![VecDeque::new(), VecDeque::new(), VecDeque::new()];
        let result = {
            let mut sink = Sink::for_test(0, &edges, &mut queues);
            node.process(burst, &mut sink)
        };
        let tx_error: Vec<Packet> = queues[1].drain(..).collect();
        let no_port: Vec<Packet> = queues[2].drain(..).collect();
        (result, tx_error, no_port)
    }

    #[test]
    fn full_burst_is_accepted_and_forwards_nothing() {
        let driver = Arc::new(StubDriver::new());
        let mut txq_map = HashMap::new();
        txq_map.insert(0u16, 0u16);
        let node = TxNode::new(driver, txq_map);

        let burst = vec![packet_for_port(0), packet_for_port(0)];
        let (result, tx_error, no_port) = run_node(&node, burst);
        assert_eq!(result.accepted, 2);
        assert_eq!(result.dropped, 0);
        assert!(tx_error.is_empty());
        assert!(no_port.is_empty());
    }

    #[test]
    fn missing_eth_metadata_goes_to_no_port() {
        let driver = Arc::new(StubDriver::new());
        let node = TxNode::new(driver, HashMap::new());

        let (result, _tx_error, no_port) = run_node(&node, vec![Packet::default()]);
        assert_eq!(result.dropped, 1);
        assert_eq!(no_port.len(), 1);
    }

    #[test]
    fn unknown_txq_goes_to_no_port() {
        let driver = Arc::new(StubDriver::new());
        let node = TxNode::new(driver, HashMap::new());

        let (result, _tx_error, no_port) = run_node(&node, vec![packet_for_port(5)]);
        assert_eq!(result.dropped, 1);
        assert_eq!(no_port.len(), 1);
    }

    #[test]
    fn driver_overflow_goes_to_tx_error() {
        let driver = Arc::new(StubDriver::new());
        driver.set_tx_limit(1);
        let mut txq_map = HashMap::new();
        txq_map.insert(0u16, 0u16);
        let node = TxNode::new(driver, txq_map);

        let burst = vec![packet_for_port(0), packet_for_port(0), packet_for_port(0)];
        let (result, tx_error, no_port) = run_node(&node, burst);
        assert_eq!(result.accepted, 1);
        assert_eq!(result.dropped, 2);
        assert_eq!(tx_error.len(), 2);
        assert!(no_port.is_empty());
    }
}
