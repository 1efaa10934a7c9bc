//! DPDK API surface: error handling plus the `rte::*` wrappers.

pub mod rte;

mod error;
pub use error::{Errno, Result, check_rte_success, rte_errno};
