#![forbid(unsafe_code)]
//! TOML configuration for workers and the coordinator.
//!
//! ```toml
//! [worker]
//! host_id = 0
//! peers = ["10.0.0.1:10000", "10.0.0.2:10000"]
//! shard = "shards/0.shard"
//!
//! [coordinator]
//! workers = ["10.0.0.1:10000", "10.0.0.2:10000"]
//! walks_per_vertex = 10
//! ```

use std::fs;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{CacheLayout, CacheOptions};
use crate::protocol::{BATCH_HEADER_LEN, DEFAULT_PAYLOAD_LIMIT, MAX_UDP_PAYLOAD};
use crate::types::{HostId, Result, StriderError};
use crate::walker::{self, HEADER_LEN};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "STRIDER_CONFIG";

/// Settings of one worker process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Index of this worker in `peers`.
    pub host_id: u32,
    /// Data address (IP and first receive port) of every worker, ordered by host id.
    pub peers: Vec<SocketAddrV4>,
    /// Address the sockets of this worker bind to.
    pub bind_ip: Ipv4Addr,
    /// Shard file holding this worker's partition.
    pub shard: Option<PathBuf>,
    /// Receive threads, one per consecutive data port.
    pub receivers: usize,
    /// TCP port accepting the warm-run release connection.
    pub control_port: u16,
    /// TCP port of the coordinator receiving reports.
    pub report_port: u16,
    /// Message processing threads during a measured run.
    pub main_processors: usize,
    /// Message processing threads during a warming run.
    pub warm_processors: usize,
    /// Walker generation threads during a measured run.
    pub main_generators: usize,
    /// Walker generation threads during a warming run.
    pub warm_generators: usize,
    /// Per-step termination probability of a walk.
    pub alpha: f64,
    /// Upper bound on the life of a fresh walker.
    pub max_life: u16,
    /// Cap on cached adjacency entries plus local edges.
    pub cache_cap: u64,
    /// Layout of the cached degree and owner records.
    pub cache_layout: CacheLayout,
    /// Vertex ids preallocated by the dense layout.
    pub dense_capacity: usize,
    /// Lock shards of the cache.
    pub cache_shards: usize,
    /// Walker ids generated per warming run at most.
    pub warm_walker_limit: u32,
    /// Walkers between two generation pauses while warming.
    pub warm_pause_every: u32,
    /// Length of a generation pause while warming, in milliseconds.
    pub warm_pause_ms: u64,
    /// Maximum datagram payload in bytes.
    pub payload_limit: usize,
    /// Delay before a report is sent, in milliseconds.
    pub report_delay_ms: u64,
    /// Seed for the per-thread random generators; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_id: 0,
            peers: vec![SocketAddrV4::new(Ipv4Addr::LOCALHOST, 10000)],
            bind_ip: Ipv4Addr::UNSPECIFIED,
            shard: None,
            receivers: 4,
            control_port: 9999,
            report_port: 9999,
            main_processors: 15,
            warm_processors: 10,
            main_generators: 15,
            warm_generators: 4,
            alpha: 0.15,
            max_life: 200,
            cache_cap: 200,
            cache_layout: CacheLayout::Dense,
            dense_capacity: 1 << 20,
            cache_shards: 64,
            warm_walker_limit: 100_000,
            warm_pause_every: 500_000,
            warm_pause_ms: 4_000,
            payload_limit: DEFAULT_PAYLOAD_LIMIT,
            report_delay_ms: 5_000,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let threads = [
            ("receivers", self.receivers),
            ("main_processors", self.main_processors),
            ("warm_processors", self.warm_processors),
            ("main_generators", self.main_generators),
            ("warm_generators", self.warm_generators),
            ("cache_shards", self.cache_shards),
        ];
        for (name, count) in threads {
            if count == 0 {
                return Err(StriderError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.host_id as usize >= self.peers.len() {
            return Err(StriderError::Config(format!(
                "host_id {} is outside the {} configured peers",
                self.host_id,
                self.peers.len()
            )));
        }
        if self.payload_limit > MAX_UDP_PAYLOAD {
            return Err(StriderError::Config(format!(
                "payload_limit {} exceeds the UDP maximum {MAX_UDP_PAYLOAD}",
                self.payload_limit
            )));
        }
        if self.payload_limit < BATCH_HEADER_LEN + HEADER_LEN {
            return Err(StriderError::Config(format!(
                "payload_limit {} cannot hold a single walker",
                self.payload_limit
            )));
        }
        let bound = self.life_bound();
        if self.max_life == 0 || self.max_life > bound {
            return Err(StriderError::Config(format!(
                "max_life {} must be in 1..={bound} for payload_limit {}",
                self.max_life, self.payload_limit
            )));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(StriderError::Config(format!(
                "alpha {} must be in (0, 1]",
                self.alpha
            )));
        }
        let last_port = usize::from(self.data_port()) + self.receivers - 1;
        if last_port > usize::from(u16::MAX) {
            return Err(StriderError::Config(format!(
                "{} receive ports starting at {} overflow the port range",
                self.receivers,
                self.data_port()
            )));
        }
        Ok(())
    }

    /// Longest walk whose record always fits one datagram.
    pub fn life_bound(&self) -> u16 {
        walker::max_life_for(self.payload_limit.saturating_sub(BATCH_HEADER_LEN))
    }

    /// Host id of this worker.
    pub fn host(&self) -> HostId {
        HostId(self.host_id)
    }

    /// First local receive port.
    pub fn data_port(&self) -> u16 {
        self.peers
            .get(self.host_id as usize)
            .map_or(10000, |peer| peer.port())
    }

    /// Address this worker reports as its own.
    pub fn local_ip(&self) -> Ipv4Addr {
        self.peers
            .get(self.host_id as usize)
            .map_or(Ipv4Addr::LOCALHOST, |peer| *peer.ip())
    }

    /// Sizing handed to the remote-vertex cache.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            cap: self.cache_cap,
            layout: self.cache_layout,
            dense_capacity: self.dense_capacity,
            shards: self.cache_shards,
        }
    }

    /// Receive queues needed by the larger of the two processing pools.
    pub fn queue_count(&self) -> usize {
        self.main_processors.max(self.warm_processors)
    }

    /// Pause between warm generation bursts.
    pub fn warm_pause(&self) -> Duration {
        Duration::from_millis(self.warm_pause_ms)
    }

    /// Delay before a report is sent.
    pub fn report_delay(&self) -> Duration {
        Duration::from_millis(self.report_delay_ms)
    }
}

/// Settings of the coordinator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// First data port of every worker, ordered by host id.
    pub workers: Vec<SocketAddrV4>,
    /// Address announced to workers; reports are accepted on it.
    pub address: Ipv4Addr,
    /// TCP port accepting worker reports.
    pub report_port: u16,
    /// TCP port workers listen on for the warm-run release.
    pub control_port: u16,
    /// Walks seeded at every vertex during the measured run.
    pub walks_per_vertex: u32,
    /// Length of the measured run before the end message, in seconds.
    pub run_secs: u64,
    /// Run a cache warming phase before measuring.
    pub warm: bool,
    /// Give up waiting for reports after this many seconds.
    pub report_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: vec![SocketAddrV4::new(Ipv4Addr::LOCALHOST, 10000)],
            address: Ipv4Addr::LOCALHOST,
            report_port: 9999,
            control_port: 9999,
            walks_per_vertex: 1,
            run_secs: 10,
            warm: false,
            report_timeout_secs: 60,
        }
    }
}

impl CoordinatorConfig {
    /// Rejects settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_empty() {
            return Err(StriderError::Config("coordinator needs at least one worker".into()));
        }
        if self.walks_per_vertex == 0 {
            return Err(StriderError::Config("walks_per_vertex must be at least 1".into()));
        }
        Ok(())
    }
}

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StriderConfig {
    /// Worker settings.
    pub worker: EngineConfig,
    /// Coordinator settings.
    pub coordinator: CoordinatorConfig,
}

impl StriderConfig {
    /// Loads `explicit`, or the default location, or built-in defaults when
    /// no file exists there.
    pub fn load(explicit: Option<PathBuf>) -> std::result::Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        match path {
            Some(path) if path.exists() => read_file(&path),
            _ => Ok(Self::default()),
        }
    }
}

fn read_file(path: &Path) -> std::result::Result<StriderConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Offending file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },
}

/// Per-user default configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("strider").join("strider.toml"))
}
