use std::path::PathBuf;

fn main() {
    // Rebuild if wrapper files change
    println!("cargo:rerun-if-changed=include/wrapper.h");
    println!("cargo:rerun-if-changed=src/wrapper.c");

    // Use pkg-config to find DPDK with static linking preferred
    let cfg = pkg_config::Config::new()
        .atleast_version("23.11.0")
        .statik(true)
        .cargo_metadata(false)
        .probe("libdpdk")
        .unwrap();

    // Use pkgconf to emit cargo metadata.
    pkgconf::PkgConfigParser::new()
        .probe_and_emit(["libdpdk"], None)
        .unwrap();

    generate_bindings(&cfg.include_paths);
}

fn generate_bindings(include_dirs: &[PathBuf]) {
    let outdir = PathBuf::from(std::env::var("OUT_DIR").unwrap());

    // Compile wrapper.c with cc. This exposes the handful of DPDK
    // `static inline` hot-path functions (mbuf/burst accessors) as real
    // symbols bindgen and the linker can see.
    let mut cc_builder = cc::Build::new();
    cc_builder.file("src/wrapper.c");
    cc_builder.include("include");
    for path in include_dirs {
        cc_builder.include(path);
    }
    // corei7/Nehalem matches DPDK's cpu_instruction_set=generic, for
    // compatibility with QEMU software emulation in CI.
    cc_builder.flag("-march=corei7");

    let mut bgbuilder = bindgen::builder();
    for path in include_dirs {
        bgbuilder = bgbuilder.clang_arg(format!("-I{}", path.display()));
    }

    let bgbuilder = bgbuilder
        // our rust wrapper functions
        .allowlist_function("rust_.*")
        // EAL lifecycle
        .allowlist_function("rte_eal_init")
        .allowlist_function("rte_eal_cleanup")
        // non-EAL thread registration (used to give worker pthreads a lcore id)
        .allowlist_function("rte_thread_register")
        .allowlist_function("rte_thread_unregister")
        // ethdev control path
        .allowlist_function("rte_eth_dev_info_get")
        .allowlist_function("rte_eth_dev_count_avail")
        .allowlist_function("rte_eth_macaddr_get")
        .allowlist_function("rte_eth_stats_get")
        .allowlist_function("rte_eth_dev_socket_id")
        .allowlist_function("rte_eth_dev_configure")
        .allowlist_function("rte_eth_dev_start")
        .allowlist_function("rte_eth_dev_stop")
        .allowlist_function("rte_eth_dev_close")
        .allowlist_function("rte_eth_rx_queue_setup")
        .allowlist_function("rte_eth_tx_queue_setup")
        .allowlist_function("rte_eth_promiscuous_enable")
        .allowlist_function("rte_eth_promiscuous_disable")
        // mempool
        .allowlist_function("rte_pktmbuf_pool_create")
        .allowlist_function("rte_mempool_free")
        .allowlist_function("rte_mempool_lookup")
        .allowlist_function("rte_mempool_avail_count")
        // generate useful dpdk types
        .allowlist_type("rte_eth_conf")
        .allowlist_type("rte_eth_dev_info")
        .allowlist_type("rte_eth_rxconf")
        .allowlist_type("rte_eth_txconf")
        .allowlist_type("rte_ether_addr")
        .allowlist_type("rte_mempool")
        .allowlist_type("rte_mbuf")
        .allowlist_type("rte_eth_stats")
        // generate useful dpdk macros defined in rte_build_config.h.
        .allowlist_var("RTE_MBUF_DEFAULT_DATAROOM")
        .allowlist_var("RTE_PKTMBUF_HEADROOM")
        .header("include/wrapper.h");

    let bindings = bgbuilder
        .generate()
        .expect("Unable to generate DPDK bindings");

    bindings
        .write_to_file(outdir.join("dpdk_bindings.rs"))
        .expect("Couldn't write bindings!");
    cc_builder.compile("dpdk_wrapper");
}
