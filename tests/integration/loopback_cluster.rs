//! Full worker thread sets talking UDP over loopback, driven by a coordinator.

#![allow(missing_docs)]

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use strider::graph::shard::owner_of;
use strider::graph::ShardEdge;
use strider::{
    Coordinator, CoordinatorConfig, Engine, EngineConfig, EngineHandle, HostId, MemoryPartition,
    VertexId,
};

const VERTICES: u64 = 20;

fn addr(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
}

/// Ring with chords, both directions, split `parts` ways.
fn shard_edges(host: u32, parts: u32) -> Vec<ShardEdge> {
    let mut edges = Vec::new();
    for v in 0..VERTICES {
        for step in [1, 3] {
            let w = (v + step) % VERTICES;
            for (src, dst) in [(v, w), (w, v)] {
                if owner_of(VertexId(src), parts) == HostId(host) {
                    edges.push(ShardEdge {
                        src: VertexId(src),
                        dst: VertexId(dst),
                        dst_host: owner_of(VertexId(dst), parts),
                    });
                }
            }
        }
    }
    edges
}

fn worker(host: u32, peers: &[SocketAddrV4], report_port: u16, control_port: u16) -> EngineHandle {
    let parts = peers.len() as u32;
    let config = EngineConfig {
        host_id: host,
        peers: peers.to_vec(),
        bind_ip: Ipv4Addr::LOCALHOST,
        receivers: 2,
        control_port,
        report_port,
        main_processors: 2,
        warm_processors: 2,
        main_generators: 2,
        warm_generators: 1,
        alpha: 0.3,
        max_life: 20,
        cache_cap: 10_000,
        warm_walker_limit: 200,
        report_delay_ms: 50,
        seed: Some(u64::from(host) + 1),
        ..EngineConfig::default()
    };
    let graph = MemoryPartition::from_edges(HostId(host), shard_edges(host, parts));
    let engine = Arc::new(Engine::new(config, Box::new(graph)).unwrap());
    engine.start().unwrap()
}

fn coordinator(workers: &[SocketAddrV4], report_port: u16, control_port: u16, warm: bool) -> Coordinator {
    Coordinator::new(CoordinatorConfig {
        workers: workers.to_vec(),
        address: Ipv4Addr::LOCALHOST,
        report_port,
        control_port,
        walks_per_vertex: 2,
        run_secs: 2,
        warm,
        report_timeout_secs: 30,
    })
    .unwrap()
}

fn stop(handles: Vec<EngineHandle>) {
    for handle in &handles {
        handle.shutdown();
    }
    for handle in handles {
        handle.join();
    }
}

#[test]
fn two_workers_complete_every_walk() {
    let peers = [addr(41_000), addr(41_010)];
    let handles = vec![
        worker(0, &peers, 41_090, 41_091),
        worker(1, &peers, 41_090, 41_092),
    ];

    let summary = coordinator(&peers, 41_090, 41_091, false).run().unwrap();

    assert_eq!(summary.missing, 0);
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.completed, 2 * VERTICES);
    assert_eq!(summary.send_failures, 0);
    assert!(summary.execution_time > 0.0);
    for handle in &handles {
        let engine = handle.engine();
        assert_eq!(engine.stats().completed(), VERTICES);
        assert!(engine.counters().snapshot().walkers_sent > 0, "walks cross partitions");
    }
    stop(handles);
}

#[test]
fn warm_run_precedes_the_measured_run() {
    let peers = [addr(42_000)];
    let handles = vec![worker(0, &peers, 42_090, 42_091)];

    let summary = coordinator(&peers, 42_090, 42_091, true).run().unwrap();

    assert_eq!(summary.warm.len(), 1);
    assert_eq!(summary.warm[0].walkers, 200);
    assert_eq!(summary.warm[0].host, Ipv4Addr::LOCALHOST);
    assert_eq!(summary.missing, 0);
    assert_eq!(summary.completed, 2 * VERTICES);
    stop(handles);
}
