//! Packet graph runtime (C5, §4.5): each worker drives a directed graph
//! of nodes over bursts of packets. Scheduling is single-threaded and
//! cooperative; there is no preemption between nodes of the same graph.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A unit of work flowing through the graph. Real deployments carry a
/// DPDK mbuf; tests and this crate's own nodes use an owned byte buffer
/// plus the protocol metadata the IPv6 output node needs.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub data: Vec<u8>,
    pub meta: crate::ip6::output::PacketMeta,
}

/// Index of an outgoing edge on a node, e.g. `ETH_OUTPUT = 0`.
pub type EdgeIndex = usize;

/// What a node's `process` call did with its burst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub accepted: usize,
    pub dropped: usize,
}

/// A graph node: a name, a processing function, and per-node context
/// captured in the closure.
///
/// Modeled as a record of closures plus opaque context rather than a
/// trait-object hierarchy (§9 "Polymorphism over node kinds" — avoid
/// inheritance, resolve edges by name at graph-build time).
pub struct Node {
    pub name: String,
    pub n_edges: usize,
    process: Box<dyn FnMut(Vec<Packet>, &mut Sink<'_>) -> ProcessResult + Send>,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        n_edges: usize,
        process: impl FnMut(Vec<Packet>, &mut Sink<'_>) -> ProcessResult + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            n_edges,
            process: Box::new(process),
        }
    }
}

/// Handed to a node's `process` closure so it can route packets onto
/// its own outgoing edges without seeing the rest of the graph.
pub struct Sink<'a> {
    node: usize,
    edges: &'a [Vec<Option<usize>>],
    queues: &'a mut [VecDeque<Packet>],
}

impl<'a> Sink<'a> {
    /// Build a `Sink` directly against caller-owned edges/queues, for
    /// unit-testing a node's `process` logic without a full `Graph`.
    #[cfg(test)]
    pub(crate) fn for_test(
        node: usize,
        edges: &'a [Vec<Option<usize>>],
        queues: &'a mut [VecDeque<Packet>],
    ) -> Self {
        Self { node, edges, queues }
    }

    /// Route a single packet onto one of the calling node's outgoing
    /// edges. Returns `false` if the edge has no target (packet is
    /// dropped).
    pub fn enqueue(&mut self, edge: EdgeIndex, packet: Packet) -> bool {
        match self.edges[self.node].get(edge).copied().flatten() {
            Some(target) => {
                self.queues[target].push_back(packet);
                true
            }
            None => false,
        }
    }

    /// Route a batch of packets onto one edge, preserving their order.
    pub fn enqueue_bulk(&mut self, edge: EdgeIndex, packets: impl IntoIterator<Item = Packet>) -> usize {
        match self.edges[self.node].get(edge).copied().flatten() {
            Some(target) => {
                let mut n = 0;
                for p in packets {
                    self.queues[target].push_back(p);
                    n += 1;
                }
                n
            }
            None => 0,
        }
    }
}

struct Inner {
    nodes: Vec<Node>,
    /// `edges[node][edge_index]` = index of the target node, or `None`
    /// if that edge is unconnected (packets enqueued there are dropped).
    edges: Vec<Vec<Option<usize>>>,
    queues: Vec<VecDeque<Packet>>,
}

/// A directed graph of nodes. Owned by a single worker at a time but
/// reached through an `Arc` from the config-handoff protocol, so the
/// scheduling state lives behind a lock — contended only in the window
/// a worker picks up a brand new graph, never across workers.
pub struct Graph {
    inner: Mutex<Inner>,
    source: usize,
    burst_size: usize,
}

impl Graph {
    /// Build a graph from nodes plus, for each node, the target node
    /// index for each of its edges (`None` = drop). `source` is the
    /// node index fresh RX bursts are injected into.
    pub fn new(nodes: Vec<Node>, edges: Vec<Vec<Option<usize>>>, source: usize) -> Self {
        let queues = nodes.iter().map(|_| VecDeque::new()).collect();
        Self {
            inner: Mutex::new(Inner {
                nodes,
                edges,
                queues,
            }),
            source,
            burst_size: 32,
        }
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.inner.lock().nodes.iter().position(|n| n.name == name)
    }

    /// Feed packets directly into a node's queue (used for re-injection
    /// after NDP resolves a next-hop, §4.6 "Flush").
    pub fn inject(&self, node: usize, packets: impl IntoIterator<Item = Packet>) {
        self.inner.lock().queues[node].extend(packets);
    }

    pub fn queue_len(&self, node: usize) -> usize {
        self.inner.lock().queues[node].len()
    }

    /// Run one scheduling pass over every node, draining each node's
    /// queue into its `process` closure. Returns the total number of
    /// packets any node accepted onward, used by the worker loop to
    /// decide whether to sleep.
    pub fn run_once(&self) -> usize {
        let mut inner = self.inner.lock();
        let n_nodes = inner.nodes.len();
        let mut produced = 0;

        for idx in 0..n_nodes {
            let take = self.burst_size.min(inner.queues[idx].len());
            if take == 0 {
                continue;
            }
            let burst: Vec<Packet> = inner.queues[idx].drain(..take).collect();

            // Swap the node out for a placeholder so its closure can
            // hold `&mut` access to the rest of the graph's queues
            // through `Sink` without also borrowing itself. Preserves
            // every node's index, which edges are keyed on.
            let mut node = std::mem::replace(
                &mut inner.nodes[idx],
                Node::new("", 0, |_, _| ProcessResult::default()),
            );

            let Inner { edges, queues, .. } = &mut *inner;
            let mut sink = Sink {
                node: idx,
                edges,
                queues,
            };
            let result = (node.process)(burst, &mut sink);
            inner.nodes[idx] = node;
            produced += result.accepted;
        }

        produced
    }

    pub fn source(&self) -> usize {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_routes_to_connected_edge() {
        let nodes = vec![
            Node::new("a", 1, |burst, sink| {
                let mut accepted = 0;
                for p in burst {
                    if sink.enqueue(0, p) {
                        accepted += 1;
                    }
                }
                ProcessResult {
                    accepted,
                    dropped: 0,
                }
            }),
            Node::new("b", 0, |_burst, _sink| ProcessResult::default()),
        ];
        let edges = vec![vec![Some(1)], vec![]];
        let graph = Graph::new(nodes, edges, 0);
        graph.inject(0, [Packet::default()]);
        let produced = graph.run_once();
        assert_eq!(produced, 1);
        assert_eq!(graph.queue_len(1), 1);
    }

    #[test]
    fn enqueue_to_unconnected_edge_is_dropped() {
        let nodes = vec![Node::new("a", 1, |burst, sink| {
            let mut result = ProcessResult::default();
            for p in burst {
                if sink.enqueue(0, p) {
                    result.accepted += 1;
                } else {
                    result.dropped += 1;
                }
            }
            result
        })];
        let edges = vec![vec![None]];
        let graph = Graph::new(nodes, edges, 0);
        graph.inject(0, [Packet::default()]);
        let produced = graph.run_once();
        assert_eq!(produced, 0);
    }
}
