//! IPv6 output node (C5/C6, §4.6): the datapath's one stateful
//! forwarding decision — hold-queue discipline, on-demand /128
//! promotion, and per-interface-type tunnel redirection.

use std::collections::HashMap;

use smoltcp::wire::{EthernetAddress, Ipv6Address};

use crate::graph::{EdgeIndex, Packet, ProcessResult, Sink};
use crate::ip6::nexthop::{HoldOutcome, NextHop, NextHopTable, NhFlags};
use crate::ip6::route::RouteTable;

pub const ETH_OUTPUT: EdgeIndex = 0;
pub const NO_ROUTE: EdgeIndex = 1;
pub const ERROR: EdgeIndex = 2;
pub const QUEUE_FULL: EdgeIndex = 3;
pub const N_EDGES: usize = 4;

const ETHERTYPE_IPV6: u16 = 0x86dd;

/// Per-protocol metadata a packet carries through the graph. Other
/// nodes only ever see their own fields populated; the IPv6 output
/// node reads `nh_id`/`dst`/`vrf_id` and writes `eth`.
#[derive(Debug, Clone, Default)]
pub struct PacketMeta {
    pub vrf_id: u16,
    pub dst: Option<Ipv6Address>,
    pub nh_id: Option<u32>,
    pub eth: Option<EthMeta>,
}

/// Eth-output block written by step 6: destination MAC, ether-type,
/// and the egress interface the TX node groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthMeta {
    pub dst_mac: EthernetAddress,
    pub ethertype: u16,
    pub iface_id: u32,
}

/// A registered egress interface: just enough to resolve a tunnel
/// override (§4.6 step 3).
#[derive(Debug, Clone, Copy)]
struct Iface {
    type_id: usize,
}

/// IPv6-multicast-destination → Ethernet-multicast MAC, RFC 2464 §7:
/// `33:33:` followed by the address's low 32 bits.
fn multicast_mac(dest: &Ipv6Address) -> EthernetAddress {
    let b = dest.as_bytes();
    EthernetAddress([0x33, 0x33, b[12], b[13], b[14], b[15]])
}

/// The IPv6 output node's per-node context (§4.5 "init allocates the
/// per-node context"). Registered interfaces and tunnel overrides are
/// populated by the control plane before the worker sees this graph.
pub struct Ip6Output {
    ifaces: HashMap<u32, Iface>,
    /// `edges[iface_type]`; defaults to `ETH_OUTPUT` for every slot
    /// until `add_tunnel` overrides one.
    tunnel_edges: Vec<EdgeIndex>,
}

impl Ip6Output {
    pub fn new(tunnel_table_size: usize) -> Self {
        Self {
            ifaces: HashMap::new(),
            tunnel_edges: vec![ETH_OUTPUT; tunnel_table_size],
        }
    }

    pub fn add_iface(&mut self, iface_id: u32, type_id: usize) {
        self.ifaces.insert(iface_id, Iface { type_id });
    }

    /// `ip6_output_add_tunnel(iface_type, node_name)` — `edge` is the
    /// already-resolved graph edge index for that tunnel node. Control
    /// plane only; panics on an out-of-range `iface_type` since the
    /// table size is a startup constant, not attacker-controlled input.
    pub fn add_tunnel(&mut self, iface_type: usize, edge: EdgeIndex) {
        assert!(
            iface_type < self.tunnel_edges.len(),
            "iface_type {iface_type} exceeds tunnel override table size {}",
            self.tunnel_edges.len()
        );
        self.tunnel_edges[iface_type] = edge;
    }

    /// Process one burst (§4.6 steps 1-6). Mutates `nexthops`/`routes`
    /// only for on-demand /128 promotion; `solicit` is forwarded to
    /// `NextHopTable::maybe_hold` unchanged. A held packet counts as
    /// neither accepted nor dropped — it is still in flight, just
    /// parked off-graph.
    pub fn process(
        &self,
        nexthops: &mut NextHopTable,
        routes: &mut RouteTable,
        burst: Vec<Packet>,
        sink: &mut Sink<'_>,
        mut solicit: impl FnMut(u32),
    ) -> ProcessResult {
        let mut result = ProcessResult::default();
        for packet in burst {
            match self.process_one(nexthops, routes, packet, sink, &mut solicit) {
                Some(ETH_OUTPUT) => result.accepted += 1,
                Some(_) => result.dropped += 1,
                None => {}
            }
        }
        result
    }

    fn process_one(
        &self,
        nexthops: &mut NextHopTable,
        routes: &mut RouteTable,
        mut packet: Packet,
        sink: &mut Sink<'_>,
        solicit: &mut impl FnMut(u32),
    ) -> Option<EdgeIndex> {
        // Step 1: no resolved next-hop.
        let Some(mut nh_id) = packet.meta.nh_id else {
            sink.enqueue(NO_ROUTE, packet);
            return Some(NO_ROUTE);
        };

        // Step 2: resolve the egress interface.
        let iface_id = nexthops.get(nh_id)?.iface_id;
        let Some(iface) = self.ifaces.get(&iface_id).copied() else {
            sink.enqueue(ERROR, packet);
            return Some(ERROR);
        };

        // Step 3: tunnel override.
        let edge = self.tunnel_edges[iface.type_id];
        if edge != ETH_OUTPUT {
            sink.enqueue(edge, packet);
            return Some(edge);
        }

        let dest = packet.meta.dst.unwrap_or(Ipv6Address::UNSPECIFIED);

        // Step 4: on-demand /128 promotion.
        if let Some(nh) = nexthops.get(nh_id) {
            if nh.is_link() && !dest.is_multicast() && dest != nh.ip {
                let vrf_id = nh.vrf_id;
                let new_nh = NextHop::new(vrf_id, nh.iface_id, dest, NhFlags::empty());
                let new_id = nexthops.insert(new_nh);
                routes.insert_host_route(vrf_id, dest, new_id);
                packet.meta.nh_id = Some(new_id);
                nh_id = new_id;
            }
        }

        // Step 5: hold-queue discipline.
        let multicast = dest.is_multicast();
        let mut packet = match nexthops.maybe_hold(nh_id, packet, multicast, &mut *solicit) {
            HoldOutcome::OkToSend(packet) => packet,
            HoldOutcome::Held => return None,
            HoldOutcome::HoldQueueFull => {
                sink.enqueue(QUEUE_FULL, Packet::default());
                return Some(QUEUE_FULL);
            }
        };

        // Step 6: write eth-output metadata and emit.
        let dst_mac = if multicast {
            multicast_mac(&dest)
        } else {
            *nexthops.get(nh_id)?.lladdr.lock()
        };
        packet.meta.eth = Some(EthMeta {
            dst_mac,
            ethertype: ETHERTYPE_IPV6,
            iface_id,
        });
        sink.enqueue(ETH_OUTPUT, packet);
        Some(ETH_OUTPUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Packet;
    use std::collections::VecDeque;

    fn addr(last: u16) -> Ipv6Address {
        Ipv6Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, last)
    }

    /// Node 0's edges route straight through to nodes `1..=N_EDGES`,
    /// one per edge index, so a test can read off which edge a packet
    /// landed on by checking which downstream queue got it. Edge index
    /// `N_EDGES` (used by `tunnel_override_redirects_before_hold_queue`)
    /// gets one extra target node.
    fn run(
        output: &Ip6Output,
        nexthops: &mut NextHopTable,
        routes: &mut RouteTable,
        packet: Packet,
        mut solicit: impl FnMut(u32),
    ) -> (Option<EdgeIndex>, Vec<Packet>) {
        let n_targets = N_EDGES + 1;
        let edges: Vec<Vec<Option<usize>>> = vec![(1..=n_targets).map(Some).collect()];
        let mut queues: Vec<VecDeque<Packet>> =
            (0..=n_targets).map(|_| VecDeque::new()).collect();

        let edge = {
            let mut sink = Sink::for_test(0, &edges, &mut queues);
            output.process_one(nexthops, routes, packet, &mut sink, &mut solicit)
        };
        let landed = match edge {
            Some(e) => queues[e + 1].drain(..).collect(),
            None => Vec::new(),
        };
        (edge, landed)
    }

    #[test]
    fn no_nexthop_goes_to_no_route() {
        let mut nexthops = NextHopTable::new(256);
        let mut routes = RouteTable::new();
        let output = Ip6Output::new(8);
        let packet = Packet::default();
        let (edge, _) = run(&output, &mut nexthops, &mut routes, packet, |_| {});
        assert_eq!(edge, Some(NO_ROUTE));
    }

    #[test]
    fn missing_iface_goes_to_error() {
        let mut nexthops = NextHopTable::new(256);
        let nh = NextHop::new(0, 7, addr(1), NhFlags::REACHABLE);
        let nh_id = nexthops.insert(nh);
        let mut routes = RouteTable::new();
        let output = Ip6Output::new(8);

        let mut packet = Packet::default();
        packet.meta.nh_id = Some(nh_id);
        packet.meta.dst = Some(addr(1));
        let (edge, _) = run(&output, &mut nexthops, &mut routes, packet, |_| {});
        assert_eq!(edge, Some(ERROR));
    }

    #[test]
    fn reachable_host_route_sends_on_eth_output() {
        let mut nexthops = NextHopTable::new(256);
        let nh = NextHop::new(0, 7, addr(1), NhFlags::REACHABLE);
        nh.mark_reachable(EthernetAddress([1, 2, 3, 4, 5, 6]));
        let nh_id = nexthops.insert(nh);
        let mut routes = RouteTable::new();
        let mut output = Ip6Output::new(8);
        output.add_iface(7, 0);

        let mut packet = Packet::default();
        packet.meta.nh_id = Some(nh_id);
        packet.meta.dst = Some(addr(1));
        let (edge, landed) = run(&output, &mut nexthops, &mut routes, packet, |_| {
            panic!("reachable entries must not solicit")
        });
        assert_eq!(edge, Some(ETH_OUTPUT));
        let eth = landed[0].meta.eth.expect("eth metadata written");
        assert_eq!(eth.dst_mac, EthernetAddress([1, 2, 3, 4, 5, 6]));
        assert_eq!(eth.ethertype, ETHERTYPE_IPV6);
    }

    #[test]
    fn unreachable_host_is_held_and_solicited_once() {
        let mut nexthops = NextHopTable::new(256);
        let nh = NextHop::new(0, 7, addr(1), NhFlags::empty());
        let nh_id = nexthops.insert(nh);
        let mut routes = RouteTable::new();
        let mut output = Ip6Output::new(8);
        output.add_iface(7, 0);

        let solicited = std::cell::Cell::new(0);
        let mut packet = Packet::default();
        packet.meta.nh_id = Some(nh_id);
        packet.meta.dst = Some(addr(1));
        let (edge, landed) = run(&output, &mut nexthops, &mut routes, packet, |_| {
            solicited.set(solicited.get() + 1);
        });
        assert_eq!(edge, None);
        assert!(landed.is_empty());
        assert_eq!(solicited.get(), 1);
        assert_eq!(nexthops.get(nh_id).unwrap().held_count(), 1);
    }

    #[test]
    fn multicast_destination_bypasses_the_hold_queue() {
        let mut nexthops = NextHopTable::new(256);
        let nh = NextHop::new(0, 7, addr(1), NhFlags::empty());
        let nh_id = nexthops.insert(nh);
        let mut routes = RouteTable::new();
        let mut output = Ip6Output::new(8);
        output.add_iface(7, 0);

        let mcast = Ipv6Address::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
        let mut packet = Packet::default();
        packet.meta.nh_id = Some(nh_id);
        packet.meta.dst = Some(mcast);
        let (edge, landed) = run(&output, &mut nexthops, &mut routes, packet, |_| {
            panic!("multicast must not solicit")
        });
        assert_eq!(edge, Some(ETH_OUTPUT));
        let eth = landed[0].meta.eth.expect("eth metadata written");
        assert_eq!(eth.dst_mac, EthernetAddress([0x33, 0x33, 0, 0, 0, 1]));
    }

    #[test]
    fn link_route_promotes_to_a_host_nexthop() {
        let mut nexthops = NextHopTable::new(256);
        let nh = NextHop::new(0, 7, addr(1), NhFlags::LINK | NhFlags::REACHABLE);
        nh.mark_reachable(EthernetAddress([9, 9, 9, 9, 9, 9]));
        let nh_id = nexthops.insert(nh);
        let mut routes = RouteTable::new();
        let mut output = Ip6Output::new(8);
        output.add_iface(7, 0);

        let mut packet = Packet::default();
        packet.meta.nh_id = Some(nh_id);
        packet.meta.dst = Some(addr(2));
        let (edge, landed) = run(&output, &mut nexthops, &mut routes, packet, |_| {});
        assert_eq!(edge, Some(ETH_OUTPUT));
        let promoted_id = landed[0].meta.nh_id.unwrap();
        assert_ne!(promoted_id, nh_id);
        assert_eq!(routes.lookup(0, &addr(2)).unwrap().0, promoted_id);
    }

    #[test]
    fn tunnel_override_redirects_before_hold_queue() {
        let mut nexthops = NextHopTable::new(256);
        let nh = NextHop::new(0, 7, addr(1), NhFlags::empty());
        let nh_id = nexthops.insert(nh);
        let mut routes = RouteTable::new();
        let mut output = Ip6Output::new(8);
        output.add_iface(7, 3);
        output.add_tunnel(3, 4);

        let mut packet = Packet::default();
        packet.meta.nh_id = Some(nh_id);
        packet.meta.dst = Some(addr(1));
        let (edge, _) = run(&output, &mut nexthops, &mut routes, packet, |_| {
            panic!("tunnel redirect must not touch the hold queue")
        });
        assert_eq!(edge, Some(4));
    }
}
