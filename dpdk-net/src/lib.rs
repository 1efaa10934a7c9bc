//! Safe wrappers around the DPDK APIs used by the packet-forwarding
//! control and data planes: EAL lifecycle, ethdev configuration, mbuf
//! pools and RX/TX queue bursts.

pub mod api;

/// A boxed error type for dpdk-net operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A Result type using BoxError.
pub type Result<T> = std::result::Result<T, BoxError>;
