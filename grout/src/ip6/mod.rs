//! IPv6 forwarding plane: next-hop table, route table, and the output
//! node that ties them together (§3, §4.6).

pub mod nexthop;
pub mod output;
pub mod route;
