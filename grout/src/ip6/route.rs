//! Per-VRF longest-prefix-match route table (§3 "Route table (IPv6)").
//!
//! No ready-made LPM crate is part of this workspace's dependency
//! stack, so lookups are a linear scan over each VRF's routes ordered
//! by prefix length, which is adequate for the seed-test scale this
//! crate targets; the sorted-by-length invariant is what makes it a
//! longest-prefix match rather than a first match.

use std::collections::HashMap;

use smoltcp::wire::Ipv6Address;

#[derive(Debug, Clone, Copy)]
struct Route {
    network: Ipv6Address,
    prefix_len: u8,
    nh_id: u32,
}

impl Route {
    fn matches(&self, dest: &Ipv6Address) -> bool {
        prefix_eq(&self.network, dest, self.prefix_len)
    }
}

fn prefix_eq(a: &Ipv6Address, b: &Ipv6Address, prefix_len: u8) -> bool {
    let full_bytes = (prefix_len / 8) as usize;
    let rem_bits = prefix_len % 8;
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a[..full_bytes] != b[..full_bytes] {
        return false;
    }
    if rem_bits == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rem_bits);
    (a[full_bytes] & mask) == (b[full_bytes] & mask)
}

#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<u16, Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vrf_id: u16, network: Ipv6Address, prefix_len: u8, nh_id: u32) {
        let routes = self.routes.entry(vrf_id).or_default();
        routes.retain(|r| !(r.network == network && r.prefix_len == prefix_len));
        routes.push(Route {
            network,
            prefix_len,
            nh_id,
        });
        // Longest prefix first so `lookup` finds the best match by
        // taking the first hit.
        routes.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));
    }

    /// Longest-prefix match lookup; returns `(next_hop_id, route_network,
    /// route_prefix_len)` so the caller can check for the connected
    /// vs. specific-host distinction (§4.6 step 4).
    pub fn lookup(&self, vrf_id: u16, dest: &Ipv6Address) -> Option<(u32, Ipv6Address, u8)> {
        self.routes
            .get(&vrf_id)
            .and_then(|routes| routes.iter().find(|r| r.matches(dest)))
            .map(|r| (r.nh_id, r.network, r.prefix_len))
    }

    /// Insert a /128 host route (§4.6 "on-demand /128 promotion").
    pub fn insert_host_route(&mut self, vrf_id: u16, dest: Ipv6Address, nh_id: u32) {
        self.insert(vrf_id, dest, 128, nh_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u16) -> Ipv6Address {
        Ipv6Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, last)
    }

    #[test]
    fn lookup_prefers_longest_match() {
        let mut table = RouteTable::new();
        table.insert(0, Ipv6Address::UNSPECIFIED, 0, 100);
        table.insert(0, addr(0), 112, 200);
        table.insert(0, addr(5), 128, 300);

        assert_eq!(table.lookup(0, &addr(5)).unwrap().0, 300);
        assert_eq!(table.lookup(0, &addr(6)).unwrap().0, 200);
        assert_eq!(
            table
                .lookup(0, &Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))
                .unwrap()
                .0,
            100
        );
    }

    #[test]
    fn insert_host_route_is_a_128_match() {
        let mut table = RouteTable::new();
        table.insert_host_route(0, addr(7), 42);
        let (nh_id, network, prefix_len) = table.lookup(0, &addr(7)).unwrap();
        assert_eq!(nh_id, 42);
        assert_eq!(prefix_len, 128);
        assert_eq!(network, addr(7));
    }
}
