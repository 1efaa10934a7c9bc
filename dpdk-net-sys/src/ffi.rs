//! Raw DPDK bindings, generated by `build.rs` via bindgen + the
//! `rust_*` wrapper functions in `src/wrapper.c`.
#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]
#![allow(unused_imports, clippy::all)]

include!(concat!(env!("OUT_DIR"), "/dpdk_bindings.rs"));
