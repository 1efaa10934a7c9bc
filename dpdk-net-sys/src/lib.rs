//! Low-level FFI bindings to DPDK, used by the `dpdk-net` safe wrappers.

pub mod ffi;
