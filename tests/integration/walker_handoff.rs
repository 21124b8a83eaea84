//! Two engines exchanging walkers through their send queues, without sockets.
//!
//! Host 0 owns vertices 0 and 1, host 1 owns vertex 5:
//!
//! ```text
//! 0 -> [1, 5]   (host 0)
//! 1 -> [0]      (host 0)
//! 5 -> [0]      (host 1)
//! ```

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};

use strider::graph::ShardEdge;
use strider::walker::flags;
use strider::{
    Engine, EngineConfig, HostId, IndexSampler, MemoryPartition, MessageKind, VertexId,
    WalkOutcome, Walker, WalkerId,
};

/// Replays a fixed sequence of edge indices.
struct Scripted(VecDeque<u64>);

impl Scripted {
    fn new(indices: &[u64]) -> Self {
        Self(indices.iter().copied().collect())
    }
}

impl IndexSampler for Scripted {
    fn sample_index(&mut self, degree: u64) -> u64 {
        let index = self.0.pop_front().expect("script exhausted");
        assert!(index < degree, "scripted index {index} outside degree {degree}");
        index
    }
}

fn edge(src: u64, dst: u64, dst_host: u32) -> ShardEdge {
    ShardEdge {
        src: VertexId(src),
        dst: VertexId(dst),
        dst_host: HostId(dst_host),
    }
}

fn engine(host: u32) -> Engine {
    let edges = match host {
        0 => vec![edge(0, 1, 0), edge(0, 5, 1), edge(1, 0, 0)],
        _ => vec![edge(5, 0, 0)],
    };
    let config = EngineConfig {
        host_id: host,
        peers: vec![
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 20000),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 20010),
        ],
        seed: Some(11),
        ..EngineConfig::default()
    };
    Engine::new(config, Box::new(MemoryPartition::from_edges(HostId(host), edges))).unwrap()
}

/// Takes the single walker queued on `from` for `to`, through the wire codec.
fn transfer(from: &Engine, to: HostId) -> Walker {
    let mut out = Vec::new();
    assert_eq!(from.send_queue(to).unwrap().try_pop_all(&mut out), 1);
    let walker = out.pop().unwrap();
    Walker::from_bytes(&walker.to_bytes()).unwrap()
}

#[test]
fn walk_crosses_to_the_owner_and_returns_home() {
    let a = engine(0);
    let b = engine(1);
    a.stats().reset(16);

    let mut walker = Walker::new(VertexId(0), 2, WalkerId(7), HostId(0), 2).unwrap();
    walker.set_run(a.stats().run());
    a.stats().record_start(walker.id(), walker.life());

    let outcome = a.execute(walker, &mut Scripted::new(&[1])).unwrap();
    assert_eq!(outcome, WalkOutcome::Suspended(HostId(1)));
    let walker = transfer(&a, HostId(1));
    assert_eq!(walker.kind(), MessageKind::Alive);
    assert_eq!(walker.flags(), flags::CROSSED_STEP | flags::CROSSED_EVER);
    assert_eq!(walker.current_vertex(), Some(VertexId(5)));
    assert_eq!(walker.life(), 1);

    // the last hop lands back on host 0, which must see the walker to end it
    let outcome = b.dispatch(walker, &mut Scripted::new(&[0])).unwrap();
    assert_eq!(outcome, Some(WalkOutcome::Suspended(HostId(0))));
    let walker = transfer(&b, HostId(0));
    assert_eq!(walker.kind(), MessageKind::Dead);

    let outcome = a.dispatch(walker, &mut Scripted::new(&[])).unwrap();
    assert_eq!(outcome, Some(WalkOutcome::Completed));
    assert_eq!(a.stats().completed(), 1);
    assert_eq!(a.stats().completed_hops(), 2);
}

#[test]
fn walk_ending_away_from_home_is_forwarded_to_its_origin() {
    let a = engine(0);
    let b = engine(1);
    a.stats().reset(16);

    let mut walker = Walker::new(VertexId(0), 2, WalkerId(3), HostId(0), 1).unwrap();
    walker.set_run(a.stats().run());
    a.stats().record_start(walker.id(), walker.life());
    assert_eq!(
        a.execute(walker, &mut Scripted::new(&[1])).unwrap(),
        WalkOutcome::Suspended(HostId(1))
    );
    let walker = transfer(&a, HostId(1));
    assert_eq!(walker.kind(), MessageKind::Dead);

    let outcome = b.dispatch(walker, &mut Scripted::new(&[])).unwrap();
    assert_eq!(outcome, Some(WalkOutcome::Forwarded(HostId(0))));
    let walker = transfer(&b, HostId(0));
    assert_eq!(walker.kind(), MessageKind::DeadForward);

    let path = walker.path();
    let visited: Vec<_> = path.iter().map(|p| (p.vertex, p.host)).collect();
    assert_eq!(
        visited,
        vec![(VertexId(0), HostId(0)), (VertexId(5), HostId(1))]
    );
    assert_eq!(path[1].degree, Some(1));
    assert_eq!(path[1].forward, Some(1));
    assert_eq!(path[1].reverse, Some(0));

    assert_eq!(
        a.dispatch(walker.clone(), &mut Scripted::new(&[])).unwrap(),
        Some(WalkOutcome::Completed)
    );
    assert_eq!(
        a.dispatch(walker, &mut Scripted::new(&[])).unwrap(),
        Some(WalkOutcome::Discarded),
        "a duplicate end is not counted twice"
    );
    assert_eq!(a.stats().completed(), 1);
}

#[test]
fn folded_walk_lets_later_walks_step_through_the_cache() {
    let a = engine(0);
    let b = engine(1);
    a.phase().enter_warm(Ipv4Addr::LOCALHOST);

    let walker = Walker::new(VertexId(0), 2, WalkerId(0), HostId(0), 1).unwrap();
    a.execute(walker, &mut Scripted::new(&[1])).unwrap();
    let walker = transfer(&a, HostId(1));
    b.dispatch(walker, &mut Scripted::new(&[])).unwrap();
    let walker = transfer(&b, HostId(0));

    assert_eq!(
        a.dispatch(walker, &mut Scripted::new(&[])).unwrap(),
        Some(WalkOutcome::Folded(1))
    );
    assert_eq!(a.cache().degree(VertexId(5)), Some(1));
    assert_eq!(a.cache().host_of(VertexId(5)), Some(HostId(1)));
    assert_eq!(a.cache().neighbor(VertexId(5), 0), Some(VertexId(0)));

    // 0 -> 5 (cached) -> 0 never leaves host 0
    let walker = Walker::new(VertexId(0), 2, WalkerId(1), HostId(0), 2).unwrap();
    let outcome = a.execute(walker, &mut Scripted::new(&[1, 0])).unwrap();
    assert!(matches!(outcome, WalkOutcome::Discarded | WalkOutcome::Folded(_)));
    assert!(a.send_queue(HostId(1)).unwrap().is_empty());
}

#[test]
fn uncached_index_resumes_at_the_owner() {
    let a = engine(0);
    let b = engine(1);
    a.stats().reset(4);

    // host 1 learns vertex 0's degree but none of its edges
    b.cache().set_degree(VertexId(0), 2);
    b.cache().set_host(VertexId(0), HostId(0));

    let mut walker = Walker::new(VertexId(0), 2, WalkerId(2), HostId(0), 3).unwrap();
    walker.set_run(a.stats().run());
    a.stats().record_start(walker.id(), walker.life());
    a.execute(walker, &mut Scripted::new(&[1])).unwrap();
    let walker = transfer(&a, HostId(1));

    // at 5 take edge 0 back to 0, then sample index 0 which host 1 cannot resolve
    let outcome = b.dispatch(walker, &mut Scripted::new(&[0, 0])).unwrap();
    assert_eq!(outcome, Some(WalkOutcome::Suspended(HostId(0))));
    let walker = transfer(&b, HostId(0));
    assert!(walker.has_next_index());
    assert!(walker.is_crossed());
    assert_eq!(walker.life(), 1);

    // host 0 follows the pending index to 1, where the walk runs out of life
    let outcome = a.dispatch(walker, &mut Scripted::new(&[])).unwrap();
    assert_eq!(outcome, Some(WalkOutcome::Completed));
}

#[test]
fn walker_from_an_earlier_run_does_not_complete_a_current_id() {
    let a = engine(0);
    a.stats().reset(4);
    let mut stale = Walker::new(VertexId(0), 2, WalkerId(1), HostId(0), 1).unwrap();
    stale.set_run(a.stats().run());

    a.stats().reset(4);
    let mut current = Walker::new(VertexId(0), 2, WalkerId(1), HostId(0), 1).unwrap();
    current.set_run(a.stats().run());
    a.stats().record_start(current.id(), current.life());

    // both walk 0 -> 1 and end there, on their origin host
    assert_eq!(
        a.execute(stale, &mut Scripted::new(&[0])).unwrap(),
        WalkOutcome::Discarded
    );
    assert_eq!(a.stats().completed(), 0);
    assert_eq!(
        a.execute(current, &mut Scripted::new(&[0])).unwrap(),
        WalkOutcome::Completed
    );
    assert_eq!(a.stats().completed(), 1);
}

#[test]
fn finished_walker_with_a_stale_index_ends_instead_of_resuming() {
    let a = engine(0);
    let mut walker = Walker::new(VertexId(0), 2, WalkerId(4), HostId(0), 1).unwrap();
    walker
        .advance(VertexId(1), HostId(0), Some(1), Some(0), None)
        .unwrap();
    walker.set_next_index(0);
    walker.set_crossed(true);
    let walker = Walker::from_bytes(&walker.to_bytes()).unwrap();
    assert_eq!(walker.kind(), MessageKind::Dead);

    let outcome = a.dispatch(walker, &mut Scripted::new(&[])).unwrap();
    assert!(matches!(
        outcome,
        Some(WalkOutcome::Discarded | WalkOutcome::Completed)
    ));
    assert!(a.send_queue(HostId(1)).unwrap().is_empty());
}

#[test]
fn control_kinds_inside_a_batch_are_rejected() {
    let a = engine(0);
    let mut walker = Walker::new(VertexId(0), 2, WalkerId(0), HostId(0), 1).unwrap();
    walker.set_kind(MessageKind::StartExperiment);
    assert!(a.dispatch(walker, &mut Scripted::new(&[])).is_err());
    assert_eq!(a.dispatch(Walker::noop(), &mut Scripted::new(&[])).unwrap(), None);
}
