//! Next-hop table (C7, §3 "Next-hop (IPv6)", §4.6 hold-queue discipline).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;
use parking_lot::Mutex;
use smoltcp::wire::{EthernetAddress, Ipv6Address};

use crate::graph::Packet;

bitflags! {
    /// Next-hop status flags. Read without a lock on the datapath; may
    /// lag by one burst (§4.6 "Concurrency").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NhFlags: u8 {
        /// Link-layer address is known and fresh.
        const REACHABLE = 0b001;
        /// A solicitation is outstanding; don't re-solicit.
        const PENDING   = 0b010;
        /// This entry came from a connected-network route, not a
        /// specific host (triggers on-demand /128 promotion).
        const LINK      = 0b100;
    }
}

/// A resolved (or resolving) IPv6 forwarding entry.
pub struct NextHop {
    pub vrf_id: u16,
    pub iface_id: u32,
    pub ip: Ipv6Address,
    pub lladdr: Mutex<EthernetAddress>,
    flags: AtomicU8,
    /// Held packets awaiting neighbor resolution, bounded at `hold_max`
    /// (§4.6). The mutex is this entry's spinlock equivalent — held
    /// only for the duration of a queue push/drain.
    held: Mutex<VecDeque<Packet>>,
}

impl NextHop {
    pub fn new(vrf_id: u16, iface_id: u32, ip: Ipv6Address, flags: NhFlags) -> Self {
        Self {
            vrf_id,
            iface_id,
            ip,
            lladdr: Mutex::new(EthernetAddress([0; 6])),
            flags: AtomicU8::new(flags.bits()),
            held: Mutex::new(VecDeque::new()),
        }
    }

    pub fn flags(&self) -> NhFlags {
        NhFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    pub fn is_reachable(&self) -> bool {
        self.flags().contains(NhFlags::REACHABLE)
    }

    pub fn is_pending(&self) -> bool {
        self.flags().contains(NhFlags::PENDING)
    }

    pub fn is_link(&self) -> bool {
        self.flags().contains(NhFlags::LINK)
    }

    fn set_pending(&self) {
        self.flags.fetch_or(NhFlags::PENDING.bits(), Ordering::Relaxed);
    }

    fn clear_pending(&self) {
        self.flags
            .fetch_and(!NhFlags::PENDING.bits(), Ordering::Relaxed);
    }

    /// Control plane: mark the entry reachable with a resolved
    /// link-layer address.
    pub fn mark_reachable(&self, lladdr: EthernetAddress) {
        *self.lladdr.lock() = lladdr;
        self.flags
            .fetch_or(NhFlags::REACHABLE.bits(), Ordering::Relaxed);
        self.clear_pending();
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Drain every held packet (used by `resolve`/flush, §4.6).
    fn drain_held(&self) -> Vec<Packet> {
        self.held.lock().drain(..).collect()
    }
}

/// Result of `maybe_hold` (§4.6 step 5). `OkToSend` carries the packet
/// back so the caller can finish writing eth-output metadata; the
/// other two variants consume it (held, or dropped on a full queue).
pub enum HoldOutcome {
    OkToSend(Packet),
    Held,
    HoldQueueFull,
}

/// Per-VRF arena of next-hops, keyed by small integer id (§9).
#[derive(Default)]
pub struct NextHopTable {
    entries: HashMap<u32, NextHop>,
    next_id: u32,
    hold_max: usize,
}

impl NextHopTable {
    pub fn new(hold_max: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 0,
            hold_max,
        }
    }

    pub fn insert(&mut self, nh: NextHop) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, nh);
        id
    }

    pub fn get(&self, id: u32) -> Option<&NextHop> {
        self.entries.get(&id)
    }

    pub fn remove(&mut self, id: u32) {
        self.entries.remove(&id);
    }

    /// §4.6 step 5: decide whether `packet` can go out now, gets held,
    /// or is dropped for a full hold queue. `multicast` is the
    /// destination's multicast-ness, decided by the caller (this table
    /// has no packet-parsing concerns).
    ///
    /// `solicit` is called at most once per unresolved next-hop between
    /// resolutions — the external NDP collaborator (§4.6 "Flush").
    pub fn maybe_hold(
        &self,
        nh_id: u32,
        packet: Packet,
        multicast: bool,
        mut solicit: impl FnMut(u32),
    ) -> HoldOutcome {
        let nh = match self.entries.get(&nh_id) {
            Some(nh) => nh,
            None => return HoldOutcome::HoldQueueFull,
        };

        if nh.is_reachable() || multicast {
            return HoldOutcome::OkToSend(packet);
        }

        let mut held = nh.held.lock();
        if held.len() >= self.hold_max {
            return HoldOutcome::HoldQueueFull;
        }
        held.push_back(packet);
        if !nh.is_pending() {
            nh.set_pending();
            drop(held);
            solicit(nh_id);
        }
        HoldOutcome::Held
    }

    /// External NDP collaborator calls this once a next-hop resolves:
    /// marks it reachable and returns every held packet so the caller
    /// can re-inject them at the head of the graph (§4.6 "Flush").
    pub fn resolve(&self, nh_id: u32, lladdr: EthernetAddress) -> Vec<Packet> {
        match self.entries.get(&nh_id) {
            Some(nh) => {
                nh.mark_reachable(lladdr);
                nh.drain_held()
            }
            None => Vec::new(),
        }
    }
}
