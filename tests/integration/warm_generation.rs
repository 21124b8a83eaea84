//! A warming run on two in-process engines, shuttling walkers between their
//! send queues until the cache of the seeding engine closes.

#![allow(missing_docs)]

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use strider::graph::shard::owner_of;
use strider::graph::ShardEdge;
use strider::{Engine, EngineConfig, HostId, MemoryPartition, UniformSampler, VertexId, Walker};

const VERTICES: u64 = 20;
const SPARE: u64 = 6;

/// Ring with chords of odd length, so every hop changes host.
fn shard_edges(host: u32) -> Vec<ShardEdge> {
    let mut edges = Vec::new();
    for v in 0..VERTICES {
        for step in [1, 3] {
            let w = (v + step) % VERTICES;
            for (src, dst) in [(v, w), (w, v)] {
                if owner_of(VertexId(src), 2) == HostId(host) {
                    edges.push(ShardEdge {
                        src: VertexId(src),
                        dst: VertexId(dst),
                        dst_host: owner_of(VertexId(dst), 2),
                    });
                }
            }
        }
    }
    edges
}

fn engine(host: u32) -> Engine {
    let edges = shard_edges(host);
    let config = EngineConfig {
        host_id: host,
        peers: vec![
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 43000),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 43010),
        ],
        warm_generators: 2,
        alpha: 0.3,
        max_life: 20,
        cache_cap: edges.len() as u64 + SPARE,
        warm_walker_limit: 1_000_000,
        warm_pause_every: 10_000,
        warm_pause_ms: 1,
        seed: Some(u64::from(host) + 5),
        ..EngineConfig::default()
    };
    Engine::new(config, Box::new(MemoryPartition::from_edges(HostId(host), edges))).unwrap()
}

/// Moves every queued walker from `from` to `to` through the wire codec.
fn deliver(from: &Engine, to: &Engine, sampler: &mut UniformSampler<StdRng>) -> usize {
    let mut out = Vec::new();
    let n = from.send_queue(to.host()).unwrap().try_pop_all(&mut out);
    for walker in out {
        let walker = Walker::from_bytes(&walker.to_bytes()).unwrap();
        to.dispatch(walker, sampler).unwrap();
    }
    n
}

#[test]
fn warm_generation_stops_when_the_cache_closes() {
    let a = engine(0);
    let b = engine(1);
    a.phase().enter_warm(Ipv4Addr::LOCALHOST);
    let stop = AtomicBool::new(false);

    let seeded = thread::scope(|scope| {
        let shuttle = scope.spawn(|| {
            let mut sampler = UniformSampler::new(StdRng::seed_from_u64(9));
            while !stop.load(Ordering::Acquire) {
                let moved = deliver(&a, &b, &mut sampler) + deliver(&b, &a, &mut sampler);
                if moved == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        });
        let seeded = a.generate_warm().unwrap();
        stop.store(true, Ordering::Release);
        shuttle.join().unwrap();
        seeded
    });

    assert!(seeded > 0);
    assert!(seeded < 1_000_000, "generation ended on the stop signal");
    assert!(a.cache().is_full());
    assert!(a.cache().size() >= SPARE);
    let signals = a.cache().signals();
    assert!(!signals.tracking());
    assert!(!signals.generating());
    assert!(signals.halted());
}
