//! Queue assignment engine (C3, §4.3): the entry point that moves an
//! RX queue's ownership between workers, growing or shrinking the
//! worker list and the symmetric TX queue maps as needed.

use crate::config::RouterConfig;
use crate::driver::Driver;
use crate::error::{Errno, Result};
use crate::port::PortRegistry;
use crate::queue::{PortId, QueueId, QueueMap};
use crate::worker::WorkerRegistry;

/// `rxq_assign(port_id, queue_id, cpu_id)` (§4.3). Returns `Ok(())` on
/// success, including the no-op case where the queue is already owned
/// by `cpu_id`. On any driver failure past worker creation, the newly
/// created worker is torn down and no other state is touched.
pub fn rxq_assign<D: Driver>(
    ports: &mut PortRegistry,
    workers: &mut WorkerRegistry,
    driver: &D,
    cfg: &RouterConfig,
    port_id: PortId,
    queue_id: QueueId,
    cpu_id: u32,
) -> Result<()> {
    let port = ports.get(port_id)?.clone();
    if queue_id >= port.n_rxq {
        return Err(Errno::ENODEV.into());
    }
    if cfg.is_main_cpu(cpu_id) {
        return Err(Errno::EBUSY.into());
    }
    if !cfg.is_allowed(cpu_id) {
        return Err(Errno::ERANGE.into());
    }

    // Step 1: already assigned to the target cpu — no-op.
    let src_idx = workers.find_owner(port_id, queue_id);
    if let Some(idx) = src_idx {
        if workers.get(idx).cpu_id == cpu_id {
            return Ok(());
        }
    }

    // Step 2: find or create the destination worker.
    let dst_idx = match workers.find_by_cpu(cpu_id) {
        Some(idx) => idx,
        None => {
            let idx = workers.create(cpu_id, cfg)?;
            if let Err(e) = provision_new_tx_queue(ports, workers, driver) {
                // Every error reaching here comes straight from a driver
                // call (queue_id/cpu_id were already validated above), so
                // it is always the resource-exhaustion/driver-failure class
                // `requires_rollback` names — checked explicitly rather
                // than assumed, so a future non-driver error added to
                // `provision_new_tx_queue` doesn't silently start tearing
                // down workers it shouldn't.
                if e.requires_rollback() {
                    workers.destroy(idx);
                }
                return Err(e);
            }
            idx
        }
    };

    // Steps 3-5: move the queue, recompute TX maps, collapse an
    // emptied src worker.
    finish_assignment(ports, workers, src_idx, dst_idx, port_id, queue_id);

    tracing::debug!(port_id, queue_id, cpu_id, "rxq assigned");
    Ok(())
}

/// Step 2's "extend every port's n_txq by one": configures the new TX
/// queue on every known port before it is recorded anywhere, so a
/// driver failure here leaves the port table untouched.
fn provision_new_tx_queue<D: Driver>(
    ports: &mut PortRegistry,
    workers: &WorkerRegistry,
    driver: &D,
) -> Result<()> {
    let new_count = workers.count() as u16;
    let new_txq_id = new_count - 1;
    for port in ports.list() {
        driver.eth_dev_configure(port.port_id, port.n_rxq, new_count)?;
        driver.eth_tx_queue_setup(port.port_id, new_txq_id)?;
    }
    ports.set_txq_count_all(new_count);
    Ok(())
}

/// Steps 3-5: move `(port_id, queue_id)` from `src_idx` (if any) to
/// `dst_idx`, then recompute every live worker's TX queue map from its
/// position in the worker list, and if that emptied `src_idx`, destroy
/// it and recompute once more (§4.3 "again renumber").
fn finish_assignment(
    ports: &PortRegistry,
    workers: &mut WorkerRegistry,
    src_idx: Option<usize>,
    dst_idx: usize,
    port_id: PortId,
    queue_id: QueueId,
) {
    if let Some(src) = src_idx {
        workers
            .get_mut(src)
            .rxqs
            .retain(|q| !(q.port_id == port_id && q.queue_id == queue_id));
    }
    workers.get_mut(dst_idx).rxqs.push(QueueMap::new(port_id, queue_id));

    let port_ids = ports.ids();
    recompute_tx_maps(workers, &port_ids);

    if let Some(src) = src_idx {
        if workers.get(src).rxqs.is_empty() {
            workers.destroy(src);
            recompute_tx_maps(workers, &port_ids);
        }
    }
}

/// §4.3 step 4: every live worker gets exactly one TX queue entry per
/// known port, with the queue id equal to the worker's position in the
/// (stable, creation-ordered) worker list.
fn recompute_tx_maps(workers: &mut WorkerRegistry, port_ids: &[PortId]) {
    for (idx, worker) in workers.iter_mut().enumerate() {
        worker.txqs = port_ids
            .iter()
            .map(|&port_id| QueueMap::new(port_id, idx as u16))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DeviceInfo, StubCall, StubDriver};

    /// Three ports, each with 2 RX queues, matching the seed fixture used
    /// throughout the C worker-assignment tests referenced by §4.3.
    fn setup() -> (PortRegistry, WorkerRegistry, RouterConfig, StubDriver) {
        let driver = StubDriver::new();
        for port_id in 0..3u16 {
            driver.set_dev_info(
                port_id,
                DeviceInfo {
                    n_rxq: 2,
                    mtu: 1500,
                    mac: [0; 6],
                },
            );
        }
        let mut ports = PortRegistry::new();
        ports.add("p0", "", &driver).unwrap();
        ports.add("p1", "", &driver).unwrap();
        ports.add("p2", "", &driver).unwrap();
        let workers = WorkerRegistry::new();
        let cfg = RouterConfig::with_allowance(0, vec![1, 2, 3]);
        (ports, workers, cfg, driver)
    }

    /// Builds on [`setup`] with two workers already owning queues, the
    /// same shape `worker_test.c`'s fixture pre-populates before each
    /// scenario: w1 (cpu 1) owns (p0,rxq0), (p0,rxq1), (p1,rxq0); w2
    /// (cpu 2) owns (p1,rxq1), (p2,rxq0), (p2,rxq1). Both already have a
    /// provisioned TX queue per port, so `ports.n_txq` starts at 2.
    fn setup_preassigned() -> (PortRegistry, WorkerRegistry, RouterConfig, StubDriver) {
        let (mut ports, mut workers, cfg, driver) = setup();
        let w1 = workers.create(1, &cfg).unwrap();
        let w2 = workers.create(2, &cfg).unwrap();
        workers.get_mut(w1).rxqs = vec![
            QueueMap::new(0, 0),
            QueueMap::new(0, 1),
            QueueMap::new(1, 0),
        ];
        workers.get_mut(w1).txqs = vec![
            QueueMap::new(0, 0),
            QueueMap::new(1, 0),
            QueueMap::new(2, 0),
        ];
        workers.get_mut(w2).rxqs = vec![
            QueueMap::new(1, 1),
            QueueMap::new(2, 0),
            QueueMap::new(2, 1),
        ];
        workers.get_mut(w2).txqs = vec![
            QueueMap::new(0, 1),
            QueueMap::new(1, 1),
            QueueMap::new(2, 1),
        ];
        ports.set_txq_count_all(2);
        (ports, workers, cfg, driver)
    }

    #[test]
    fn first_assignment_creates_a_worker() {
        let (mut ports, mut workers, cfg, driver) = setup();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 1).unwrap();

        assert_eq!(workers.count(), 1);
        let w = workers.get(0);
        assert_eq!(w.cpu_id, 1);
        assert_eq!(w.rxqs, vec![QueueMap::new(0, 0)]);
        assert_eq!(w.txqs, vec![QueueMap::new(0, 0), QueueMap::new(1, 0), QueueMap::new(2, 0)]);
        for port in ports.list() {
            assert_eq!(port.n_txq, 1);
        }
    }

    #[test]
    fn second_queue_to_same_cpu_reuses_the_worker() {
        let (mut ports, mut workers, cfg, driver) = setup();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 1).unwrap();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 1, 1).unwrap();

        assert_eq!(workers.count(), 1);
        assert_eq!(
            workers.get(0).rxqs,
            vec![QueueMap::new(0, 0), QueueMap::new(0, 1)]
        );
    }

    #[test]
    fn reassigning_to_a_new_cpu_moves_the_queue_and_grows_tx_maps() {
        let (mut ports, mut workers, cfg, driver) = setup();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 1).unwrap();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 1, 0, 2).unwrap();

        assert_eq!(workers.count(), 2);
        let w1 = workers.find_by_cpu(1).unwrap();
        let w2 = workers.find_by_cpu(2).unwrap();
        assert_eq!(workers.get(w1).rxqs, vec![QueueMap::new(0, 0)]);
        assert_eq!(workers.get(w2).rxqs, vec![QueueMap::new(1, 0)]);
        for port in ports.list() {
            assert_eq!(port.n_txq, 2);
        }
        assert_eq!(workers.get(w1).txqs[0], QueueMap::new(0, w1 as u16));
        assert_eq!(workers.get(w2).txqs[0], QueueMap::new(0, w2 as u16));
    }

    #[test]
    fn moving_the_last_queue_off_a_worker_destroys_it_and_renumbers() {
        let (mut ports, mut workers, cfg, driver) = setup();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 1).unwrap();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 1, 0, 2).unwrap();
        assert_eq!(workers.count(), 2);

        // Move worker 1's only queue over to worker 2's cpu; worker 1
        // should be torn down.
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 2).unwrap();

        assert_eq!(workers.count(), 1);
        assert!(workers.find_by_cpu(1).is_none());
        let remaining = workers.find_by_cpu(2).unwrap();
        assert_eq!(
            workers.get(remaining).rxqs,
            vec![QueueMap::new(1, 0), QueueMap::new(0, 0)]
        );
        // Renumbered down to a single worker's TX maps.
        assert_eq!(workers.get(remaining).txqs[0], QueueMap::new(0, 0));
    }

    #[test]
    fn reassigning_to_the_owning_cpu_is_a_no_op() {
        let (mut ports, mut workers, cfg, driver) = setup();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 1).unwrap();
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 1).unwrap();
        assert_eq!(workers.count(), 1);
        assert_eq!(workers.get(0).rxqs, vec![QueueMap::new(0, 0)]);
    }

    #[test]
    fn unknown_port_or_queue_is_enodev() {
        let (mut ports, mut workers, cfg, driver) = setup();
        assert_eq!(
            rxq_assign(&mut ports, &mut workers, &driver, &cfg, 99, 0, 1)
                .unwrap_err()
                .errno,
            Errno::ENODEV
        );
        assert_eq!(
            rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 5, 1)
                .unwrap_err()
                .errno,
            Errno::ENODEV
        );
    }

    #[test]
    fn main_cpu_and_out_of_range_cpu_are_rejected() {
        let (mut ports, mut workers, cfg, driver) = setup();
        assert_eq!(
            rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 0)
                .unwrap_err()
                .errno,
            Errno::EBUSY
        );
        assert_eq!(
            rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 9)
                .unwrap_err()
                .errno,
            Errno::ERANGE
        );
    }

    #[test]
    fn driver_failure_rolls_back_the_new_worker() {
        let (mut ports, mut workers, cfg, driver) = setup();
        driver.fail_nth(StubCall::TxQueueSetup, 1, Errno::ENOMEM);

        let err = rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 1).unwrap_err();
        assert_eq!(err.errno, Errno::ENOMEM);
        assert_eq!(workers.count(), 0);
        for port in ports.list() {
            assert_eq!(port.n_txq, 0);
        }
    }

    #[test]
    fn assigning_a_queue_already_owned_by_the_target_cpu_is_a_no_op() {
        let (mut ports, mut workers, cfg, driver) = setup_preassigned();
        let w2 = workers.find_by_cpu(2).unwrap();
        let before = workers.get(w2).rxqs.clone();

        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 1, 1, 2).unwrap();

        assert_eq!(workers.count(), 2);
        assert_eq!(workers.get(w2).rxqs, before);
    }

    #[test]
    fn an_out_of_range_rxq_on_an_existing_port_is_rejected() {
        let (mut ports, mut workers, cfg, driver) = setup_preassigned();
        let err = rxq_assign(&mut ports, &mut workers, &driver, &cfg, 1, 2, 1).unwrap_err();
        assert_eq!(err.errno, Errno::ENODEV);
    }

    #[test]
    fn moving_a_queue_to_an_existing_worker_leaves_the_worker_count_and_tx_maps_alone() {
        let (mut ports, mut workers, cfg, driver) = setup_preassigned();
        let w1 = workers.find_by_cpu(1).unwrap();
        let w2 = workers.find_by_cpu(2).unwrap();

        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 1, 1, 1).unwrap();

        assert_eq!(workers.count(), 2);
        assert_eq!(
            workers.get(w1).rxqs,
            vec![
                QueueMap::new(0, 0),
                QueueMap::new(0, 1),
                QueueMap::new(1, 0),
                QueueMap::new(1, 1),
            ]
        );
        assert_eq!(
            workers.get(w2).rxqs,
            vec![QueueMap::new(2, 0), QueueMap::new(2, 1)]
        );
        // No worker was created or destroyed, so the TX maps this
        // fixture started with are untouched.
        for port in ports.list() {
            assert_eq!(port.n_txq, 2);
        }
    }

    #[test]
    fn draining_a_worker_down_to_empty_destroys_it_and_renumbers_tx_maps() {
        let (mut ports, mut workers, cfg, driver) = setup_preassigned();

        // Move all three of w2's queues over to w1 one at a time; the
        // last move empties w2 and it is torn down.
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 1, 1, 1).unwrap();
        assert_eq!(workers.count(), 2);
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 2, 0, 1).unwrap();
        assert_eq!(workers.count(), 2);
        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 2, 1, 1).unwrap();

        assert_eq!(workers.count(), 1);
        assert!(workers.find_by_cpu(2).is_none());
        let remaining = workers.find_by_cpu(1).unwrap();
        assert_eq!(
            workers.get(remaining).rxqs,
            vec![
                QueueMap::new(0, 0),
                QueueMap::new(0, 1),
                QueueMap::new(1, 0),
                QueueMap::new(1, 1),
                QueueMap::new(2, 0),
                QueueMap::new(2, 1),
            ]
        );
        // Renumbered down to the single surviving worker's TX maps.
        for port in ports.list() {
            assert_eq!(
                workers
                    .get(remaining)
                    .txqs
                    .iter()
                    .find(|q| q.port_id == port.port_id)
                    .unwrap()
                    .queue_id,
                0
            );
        }
    }

    #[test]
    fn assigning_a_queue_to_a_brand_new_cpu_grows_every_ports_tx_queue_count() {
        let (mut ports, mut workers, cfg, driver) = setup_preassigned();

        rxq_assign(&mut ports, &mut workers, &driver, &cfg, 0, 0, 3).unwrap();

        assert_eq!(workers.count(), 3);
        let w3 = workers.find_by_cpu(3).unwrap();
        assert_eq!(workers.get(w3).rxqs, vec![QueueMap::new(0, 0)]);
        for port in ports.list() {
            assert_eq!(port.n_txq, 3);
        }
        // Every live worker's TX map grew to 3 entries, one per port.
        for worker in workers.iter() {
            assert_eq!(worker.txqs.len(), 3);
        }
    }
}
