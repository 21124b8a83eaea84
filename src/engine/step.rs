use tracing::trace;

use super::generate::IndexSampler;
use super::Engine;
use crate::protocol::MessageKind;
use crate::types::{EdgeIndex, HostId, Result, StriderError, VertexId};
use crate::walker::Walker;

/// Where a walker ended up after the engine stopped driving it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Queued for transport to the owner of its current vertex.
    Suspended(HostId),
    /// Finished away from its origin and queued back to it.
    Forwarded(HostId),
    /// Finished at its origin and recorded as completed.
    Completed,
    /// Finished at its origin and folded into the cache; carries the entries admitted.
    Folded(usize),
    /// Finished at its origin outside any run that accounts for it.
    Discarded,
}

impl Engine {
    /// Drives `walker` until it finishes or has to leave this worker.
    ///
    /// On an owned vertex the next hop comes from the local adjacency list,
    /// following a pending index when the walker was sent here to resolve
    /// one. On a remote vertex with a cached degree the hop comes from the
    /// cache; if the sampled index is not cached the walker is sent to the
    /// owner with that index attached. A remote vertex without a cached
    /// degree always suspends the walker.
    pub fn execute<S>(&self, mut walker: Walker, sampler: &mut S) -> Result<WalkOutcome>
    where
        S: IndexSampler + ?Sized,
    {
        loop {
            let current = walker
                .current_vertex()
                .ok_or(StriderError::EmptyPath(walker.id()))?;

            if self.graph.has_vertex(current) {
                let degree = self.graph.degree(current).unwrap_or(0);
                walker.set_current_degree(degree);
                if let Some(prev) = walker.prev_vertex() {
                    if let Some(index) = self.graph.index_of(current, prev) {
                        walker.set_current_reverse(index);
                    }
                }

                if walker.is_end() || degree == 0 {
                    return self.end_walk(walker);
                } else if walker.is_crossed() && walker.has_next_index() {
                    let index = walker.take_next_index()?;
                    let next = self
                        .graph
                        .neighbor(current, index)
                        .ok_or(StriderError::Protocol("pending index outside the adjacency list"))?;
                    self.hop(&mut walker, next, index)?;
                } else {
                    let index = sampler.sample_index(degree);
                    let next = self
                        .graph
                        .neighbor(current, index)
                        .ok_or(StriderError::Corruption("sampled index outside the adjacency list"))?;
                    self.hop(&mut walker, next, index)?;
                }
                continue;
            }

            let Some(degree) = self.cache.degree(current) else {
                if walker.current_host() == Some(self.host) {
                    // owned vertex missing from the partition: a sink
                    walker.set_current_degree(0);
                    return self.end_walk(walker);
                }
                walker.set_crossed(true);
                return self.suspend(walker);
            };
            walker.set_current_degree(degree);
            if walker.is_end() || degree == 0 {
                return self.end_walk(walker);
            }
            let index = sampler.sample_index(degree);
            match self.cache.neighbor(current, index) {
                Some(next) => self.hop(&mut walker, next, index)?,
                None => {
                    walker.set_next_index(index);
                    walker.set_crossed(true);
                    return self.suspend(walker);
                }
            }
        }
    }

    /// Handles one walker popped from a receive queue.
    ///
    /// Returns `None` for no-op messages.
    pub fn dispatch<S>(&self, walker: Walker, sampler: &mut S) -> Result<Option<WalkOutcome>>
    where
        S: IndexSampler + ?Sized,
    {
        match walker.kind() {
            MessageKind::Alive | MessageKind::Dead => self.execute(walker, sampler).map(Some),
            MessageKind::DeadForward => Ok(Some(self.finish_at_origin(walker))),
            MessageKind::Noop => Ok(None),
            MessageKind::Batch
            | MessageKind::StartExperiment
            | MessageKind::CacheWarm
            | MessageKind::EndExperiment => Err(StriderError::Protocol(
                "control message kind inside a walker batch",
            )),
        }
    }

    fn hop(&self, walker: &mut Walker, next: VertexId, index: EdgeIndex) -> Result<()> {
        let (host, degree) = if self.graph.has_vertex(next) {
            (self.host, self.graph.degree(next))
        } else {
            let host = self
                .graph
                .host_of(next)
                .or_else(|| self.cache.host_of(next))
                .ok_or(StriderError::UnknownHost(next))?;
            (host, self.cache.degree(next))
        };
        walker.advance(next, host, degree, Some(index), None)?;
        trace!(
            walker = %walker.id(),
            vertex = %next,
            host = %host,
            life = walker.life(),
            "engine.walker.hop"
        );
        Ok(())
    }

    fn suspend(&self, walker: Walker) -> Result<WalkOutcome> {
        let host = walker
            .current_host()
            .ok_or(StriderError::EmptyPath(walker.id()))?;
        if host == self.host {
            return Err(StriderError::Protocol("walker routed back to its own host"));
        }
        let queue = self
            .send_queues
            .get(host.index())
            .ok_or(StriderError::Protocol("walker routed to an unknown host"))?;
        trace!(
            walker = %walker.id(),
            to = %host,
            pending = walker.has_next_index(),
            "engine.walker.suspend"
        );
        queue.push(walker);
        Ok(WalkOutcome::Suspended(host))
    }

    fn end_walk(&self, mut walker: Walker) -> Result<WalkOutcome> {
        walker.set_kind(MessageKind::DeadForward);
        let origin = walker
            .origin_host()
            .ok_or(StriderError::EmptyPath(walker.id()))?;
        if origin == self.host {
            return Ok(self.finish_at_origin(walker));
        }
        let queue = self
            .send_queues
            .get(origin.index())
            .ok_or(StriderError::Protocol("walker originates at an unknown host"))?;
        trace!(walker = %walker.id(), to = %origin, "engine.walker.forward");
        queue.push(walker);
        Ok(WalkOutcome::Forwarded(origin))
    }

    fn finish_at_origin(&self, walker: Walker) -> WalkOutcome {
        if self.phase.folding() && walker.is_crossed_ever() {
            WalkOutcome::Folded(self.cache.add_walker(&walker, self.graph.as_ref()))
        } else if self.phase.is_main()
            && walker.run() == self.stats.run()
            && self.stats.record_end(walker.id())
        {
            WalkOutcome::Completed
        } else {
            WalkOutcome::Discarded
        }
    }
}
