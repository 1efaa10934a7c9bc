//! Wires the control-plane registries and the datapath graph together
//! behind the external API (§4.3 step 6, §4.4 "Publish").
//!
//! Each worker's graph is two nodes: the IPv6 output node feeding a TX
//! node. RX ingestion and protocol parsing are out of scope here (§1);
//! a real pipeline would inject bursts into an earlier parse node, but
//! this integration injects straight into IPv6 output so the
//! assignment engine's graph-reload contract has something concrete to
//! rebuild and publish.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::assign;
use crate::config::RouterConfig;
use crate::driver::Driver;
use crate::error::Result;
use crate::graph::{Graph, Node};
use crate::ip6::nexthop::NextHopTable;
use crate::ip6::output::{self, Ip6Output};
use crate::ip6::route::RouteTable;
use crate::port::PortRegistry;
use crate::queue::{PortId, QueueId};
use crate::tx::{self, TxNode};
use crate::worker::{GraphConfig, WorkerRegistry};

pub struct Router<D: Driver> {
    pub ports: PortRegistry,
    pub workers: WorkerRegistry,
    pub nexthops: Arc<Mutex<NextHopTable>>,
    pub routes: Arc<Mutex<RouteTable>>,
    pub ip6_output: Arc<Ip6Output>,
    pub cfg: RouterConfig,
    pub driver: Arc<D>,
    pub max_sleep_us: u32,
}

impl<D: Driver + 'static> Router<D> {
    pub fn new(cfg: RouterConfig, driver: Arc<D>) -> Self {
        Self {
            ports: PortRegistry::new(),
            workers: WorkerRegistry::new(),
            nexthops: Arc::new(Mutex::new(NextHopTable::new(cfg.hold_max))),
            routes: Arc::new(Mutex::new(RouteTable::new())),
            ip6_output: Arc::new(Ip6Output::new(cfg.tunnel_table_size)),
            max_sleep_us: 100,
            cfg,
            driver,
        }
    }

    /// `RXQ_SET` (§6): reassign a queue, then rebuild and publish every
    /// worker's graph so the new ownership takes effect.
    pub fn rxq_set(&mut self, port_id: PortId, queue_id: QueueId, cpu_id: u32) -> Result<()> {
        assign::rxq_assign(
            &mut self.ports,
            &mut self.workers,
            self.driver.as_ref(),
            &self.cfg,
            port_id,
            queue_id,
            cpu_id,
        )?;
        self.reload_all_graphs();
        Ok(())
    }

    /// `worker_graph_reload_all()` (§4.3 step 6): rebuild each worker's
    /// graph from its current TX queue map and publish it through the
    /// control/data hand-off (§4.4).
    pub fn reload_all_graphs(&self) {
        for worker in self.workers.iter() {
            let txq_map: HashMap<PortId, QueueId> = worker
                .txqs
                .iter()
                .map(|q| (q.port_id, q.queue_id))
                .collect();
            let graph = self.build_graph(txq_map);
            worker.config.publish(GraphConfig {
                graph: Some(Arc::new(graph)),
                max_sleep_us: self.max_sleep_us,
            });
        }
    }

    fn build_graph(&self, txq_map: HashMap<PortId, QueueId>) -> Graph {
        let nexthops = self.nexthops.clone();
        let routes = self.routes.clone();
        let ip6_output = self.ip6_output.clone();
        let ip6_node = Node::new(
            "ip6_output",
            output::N_EDGES,
            move |burst, sink| {
                let mut nexthops = nexthops.lock();
                let mut routes = routes.lock();
                ip6_output.process(&mut nexthops, &mut routes, burst, sink, |_nh_id| {
                    // NDP solicitation is outside this integration's
                    // scope; a real deployment would enqueue a
                    // neighbor-solicitation packet here.
                })
            },
        );

        let tx_node = TxNode::new(self.driver.clone(), txq_map);
        let tx_node = Node::new("tx", tx::N_EDGES, move |burst, sink| tx_node.process(burst, sink));

        let edges = vec![
            vec![Some(1), None, None, None], // ip6_output: ETH_OUTPUT -> tx
            vec![None, None],                // tx: TX_ERROR, NO_PORT both terminal
        ];
        Graph::new(vec![ip6_node, tx_node], edges, 0)
    }
}
