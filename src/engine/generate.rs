use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::Engine;
use crate::types::{Result, StriderError, VertexId, WalkerId};
use crate::walker::Walker;

/// Source of the uniformly random edge index taken at every step.
pub trait IndexSampler {
    /// Returns an index in `0..degree`; `degree` is never zero.
    fn sample_index(&mut self, degree: u64) -> u64;
}

/// [`IndexSampler`] backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct UniformSampler<R> {
    rng: R,
}

impl<R: Rng> UniformSampler<R> {
    /// Wraps `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// The wrapped generator, for draws other than edge indices.
    pub fn rng(&mut self) -> &mut R {
        &mut self.rng
    }
}

impl<R: Rng> IndexSampler for UniformSampler<R> {
    fn sample_index(&mut self, degree: u64) -> u64 {
        self.rng.gen_range(0..degree)
    }
}

/// Draws a walk length from a geometric distribution with per-step stop
/// probability `alpha`, clamped to `1..=max_life`.
pub fn draw_life<R: Rng + ?Sized>(rng: &mut R, alpha: f64, max_life: u16) -> u16 {
    if alpha >= 1.0 || max_life <= 1 {
        return 1;
    }
    let u: f64 = rng.gen();
    let extra = ((1.0 - u).ln() / (1.0 - alpha).ln()).floor();
    if extra.is_finite() && extra < f64::from(max_life - 1) {
        1 + extra.max(0.0) as u16
    } else {
        max_life
    }
}

impl Engine {
    /// Per-thread generator: seeded from the config when set, otherwise from entropy.
    pub(crate) fn walk_rng(&self, salt: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ (u64::from(self.host.0) << 32) ^ salt),
            None => StdRng::from_entropy(),
        }
    }

    /// Creates walker `id` at `vertex` with a freshly drawn life.
    pub fn seed_walker<R: Rng>(&self, id: WalkerId, vertex: VertexId, rng: &mut R) -> Result<Walker> {
        let life = draw_life(rng, self.config.alpha, self.config.max_life);
        let degree = self.graph.degree(vertex).unwrap_or(0);
        Walker::new(vertex, degree, id, self.host, life)
    }

    /// Seeds `walks_per_vertex` walks at every owned vertex and runs each
    /// until it finishes or leaves this worker.
    ///
    /// Generator `g` of `G` handles ids `g, g + G, g + 2G, ...`; id `i` starts at
    /// owned vertex `i mod n`. Returns the number of walks seeded.
    pub fn generate_main(&self, walks_per_vertex: u32) -> Result<u32> {
        let vertices = self.graph.vertices();
        let total = vertices.len() as u64 * u64::from(walks_per_vertex);
        let total = u32::try_from(total).map_err(|_| {
            StriderError::Config(format!("{total} walks do not fit 32-bit walker ids"))
        })?;
        self.stats.reset(total as usize);
        let run = self.stats.run();
        if total == 0 {
            warn!(host = %self.host, "engine.generate.empty");
            return Ok(0);
        }
        let generators = self.config.main_generators as u32;
        info!(host = %self.host, total, generators, "engine.generate.main.start");

        thread::scope(|scope| {
            let handles: Vec<_> = (0..generators)
                .map(|g| {
                    scope.spawn(move || -> Result<()> {
                        let mut sampler = UniformSampler::new(self.walk_rng(u64::from(g)));
                        let mut id = g;
                        while id < total {
                            let vertex = vertices[(id as usize) % vertices.len()];
                            let mut walker = self.seed_walker(WalkerId(id), vertex, sampler.rng())?;
                            walker.set_run(run);
                            self.stats.record_start(walker.id(), walker.life());
                            self.execute(walker, &mut sampler)?;
                            id = match id.checked_add(generators) {
                                Some(next) => next,
                                None => break,
                            };
                        }
                        Ok(())
                    })
                })
                .collect();
            for handle in handles {
                handle
                    .join()
                    .unwrap_or(Err(StriderError::Protocol("generator thread panicked")))?;
            }
            Ok::<(), StriderError>(())
        })?;

        info!(host = %self.host, total, "engine.generate.main.done");
        Ok(total)
    }

    /// Seeds warming walks until the cache closes or the id ceiling is reached,
    /// pausing periodically. Returns the number of walks seeded.
    pub fn generate_warm(&self) -> Result<u32> {
        let vertices = self.graph.vertices();
        if vertices.is_empty() {
            warn!(host = %self.host, "engine.generate.empty");
            return Ok(0);
        }
        let generators = self.config.warm_generators as u32;
        let limit = self.config.warm_walker_limit;
        let pause_every = self.config.warm_pause_every.max(1);
        let run = self.stats.run();
        info!(host = %self.host, limit, generators, "engine.generate.warm.start");

        let seeded = thread::scope(|scope| {
            let handles: Vec<_> = (0..generators)
                .map(|g| {
                    scope.spawn(move || -> Result<u32> {
                        let mut sampler = UniformSampler::new(self.walk_rng(u64::from(g) | 1 << 31));
                        let mut id = g;
                        let mut seeded = 0u32;
                        let mut next_pause = pause_every;
                        while self.phase.generating() && id < limit && !self.phase.is_shutting_down() {
                            let vertex = vertices[(id as usize) % vertices.len()];
                            let mut walker = self.seed_walker(WalkerId(id), vertex, sampler.rng())?;
                            walker.set_run(run);
                            self.execute(walker, &mut sampler)?;
                            seeded += 1;
                            id = match id.checked_add(generators) {
                                Some(next) => next,
                                None => break,
                            };
                            if id >= next_pause {
                                debug!(
                                    generator = g,
                                    id,
                                    cache_size = self.cache.size(),
                                    "engine.generate.warm.pause"
                                );
                                thread::sleep(self.config.warm_pause());
                                next_pause = next_pause.saturating_add(pause_every);
                            }
                        }
                        Ok(seeded)
                    })
                })
                .collect();
            let mut seeded = 0u32;
            for handle in handles {
                seeded += handle
                    .join()
                    .unwrap_or(Err(StriderError::Protocol("generator thread panicked")))?;
            }
            Ok::<u32, StriderError>(seeded)
        })?;

        info!(
            host = %self.host,
            seeded,
            cache_size = self.cache.size(),
            cache_full = self.cache.is_full(),
            "engine.generate.warm.done"
        );
        Ok(seeded)
    }
}
