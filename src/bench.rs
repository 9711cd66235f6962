//! Throughput benchmark driver for the storage engines.
//!
//! A run writes or reads `n` keys spread over a number of threads and stores,
//! then reports the elapsed time. Keys are SHA-256 digests of sequential ids so
//! reads can regenerate and verify what an earlier write run stored.

use anyhow::{anyhow, bail, Context};
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::storage::engine::logstore::LogStore;
use crate::storage::engine::memory::MemoryEngine;
use crate::storage::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Op {
    Write,
    #[value(name = "randwrite")]
    RandWrite,
    Read,
    #[value(name = "randread")]
    RandRead,
}

impl Op {
    fn is_write(self) -> bool {
        matches!(self, Op::Write | Op::RandWrite)
    }

    fn is_random(self) -> bool {
        matches!(self, Op::RandWrite | Op::RandRead)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EngineKind {
    /// The append-only log store
    Log,
    /// Process-local hash map, nothing persisted. Every run starts empty, so
    /// read ops against it always fail verification.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ValueGen {
    /// Pseudo-random bytes from a multiply chain seeded by the key id
    Fnv,
    /// Byte `j` is `id + j`
    Simple,
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of operations.
    pub n: u64,
    /// Number of distinct keys, defaults to `n` when zero.
    pub key_space: u64,
    pub start_key: u64,
    pub op: Op,
    /// Log progress every this many operations per thread, 0 disables it.
    pub report_interval: u64,
    pub value_size_small: usize,
    pub value_size_big: usize,
    pub threads: usize,
    /// Number of independent stores keys are sharded over.
    pub stores: usize,
    pub engine: EngineKind,
    pub value_gen: ValueGen,
    /// Directory holding the data files of the log stores.
    pub data_dir: PathBuf,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            n: 1_000_000,
            key_space: 0,
            start_key: 0,
            op: Op::RandWrite,
            report_interval: 100_000,
            value_size_small: 50,
            value_size_big: 51,
            threads: 8,
            stores: 1,
            engine: EngineKind::Log,
            value_gen: ValueGen::Fnv,
            data_dir: PathBuf::from("."),
        }
    }
}

impl BenchConfig {
    fn key_space(&self) -> u64 {
        if self.key_space == 0 {
            self.n
        } else {
            self.key_space
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.key_space() < self.n {
            bail!(
                "insufficient keys: key space {} is smaller than {} operations",
                self.key_space(),
                self.n
            );
        }
        if self.value_size_big <= self.value_size_small {
            bail!(
                "big value size {} must exceed small value size {}",
                self.value_size_big,
                self.value_size_small
            );
        }
        if self.threads == 0 || self.stores == 0 {
            bail!("threads and stores must both be at least 1");
        }
        Ok(())
    }

    /// Path of the data file backing store `i`.
    pub fn store_path(&self, i: usize) -> PathBuf {
        self.data_dir.join(format!("bench_simple_{i}"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Report {
    pub ops: u64,
    pub elapsed: Duration,
}

impl Report {
    pub fn ops_per_sec(&self) -> f64 {
        self.ops as f64 / self.elapsed.as_secs_f64()
    }
}

/// Opens the configured engines, runs the workload and closes them again.
pub fn run(config: &BenchConfig) -> anyhow::Result<Report> {
    config.validate()?;

    match config.engine {
        EngineKind::Log => {
            let stores = (0..config.stores)
                .map(|i| {
                    let path = config.store_path(i);
                    LogStore::open(&path)
                        .with_context(|| format!("failed to open {}", path.display()))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            finish(run_workload(&stores, config), &stores)
        }
        EngineKind::Memory => {
            let stores: Vec<_> = (0..config.stores).map(|_| MemoryEngine::new()).collect();
            finish(run_workload(&stores, config), &stores)
        }
    }
}

fn finish<E: Engine>(report: anyhow::Result<Report>, stores: &[E]) -> anyhow::Result<Report> {
    for store in stores {
        store.close()?;
    }
    report
}

/// Runs the configured operation against already opened stores.
pub fn run_workload<E: Engine + Sync>(
    stores: &[E],
    config: &BenchConfig,
) -> anyhow::Result<Report> {
    config.validate()?;

    let keys = generate_keys(config);
    let keys = &keys[..config.n as usize];
    let chunk = keys.len() / config.threads;

    let start = Instant::now();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..config.threads)
            .map(|thread| {
                let begin = thread * chunk;
                let end = if thread == config.threads - 1 {
                    keys.len()
                } else {
                    begin + chunk
                };
                let keys = &keys[begin..end];
                s.spawn(move || worker(thread, keys, stores, config))
            })
            .collect();

        handles.into_iter().try_for_each(|handle| {
            handle
                .join()
                .map_err(|_| anyhow!("benchmark worker panicked"))?
        })
    })?;
    let elapsed = start.elapsed();

    let report = Report {
        ops: config.n,
        elapsed,
    };
    tracing::info!(
        used_time = elapsed.as_secs_f64(),
        ops = report.ops_per_sec(),
        "benchmark finished"
    );
    Ok(report)
}

fn worker<E: Engine>(
    thread: usize,
    keys: &[u64],
    stores: &[E],
    config: &BenchConfig,
) -> anyhow::Result<()> {
    for (i, &id) in keys.iter().enumerate() {
        let key = key_for(id);
        let size = value_size(config, id);
        let store = &stores[(id % stores.len() as u64) as usize];

        if config.op.is_write() {
            let value = generate_value(config.value_gen, size, id);
            store
                .put(&key, &value)
                .with_context(|| format!("write of key {id} failed"))?;
            tracing::trace!(thread, key = id, "write");
        } else {
            let value = store
                .get(&key)
                .with_context(|| format!("read of key {id} failed"))?;
            if value.len() != size {
                bail!(
                    "data verification failed for key {id}: expected {size} bytes, got {}",
                    value.len()
                );
            }
            tracing::trace!(thread, key = id, "read");
        }

        if config.report_interval != 0 && i as u64 % config.report_interval == 0 {
            tracing::info!(thread, task = i, "progress");
        }
    }
    Ok(())
}

fn generate_keys(config: &BenchConfig) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..config.key_space())
        .map(|i| i + config.start_key)
        .collect();

    if config.op.is_random() {
        keys.shuffle(&mut rand::thread_rng());
    }
    keys
}

/// SHA-256 of the big-endian key id.
pub fn key_for(id: u64) -> [u8; 32] {
    Sha256::digest(id.to_be_bytes()).into()
}

fn value_size(config: &BenchConfig, id: u64) -> usize {
    let spread = (config.value_size_big - config.value_size_small) as u64;
    config.value_size_small + (id % spread) as usize
}

pub fn generate_value(value_gen: ValueGen, size: usize, id: u64) -> Vec<u8> {
    match value_gen {
        ValueGen::Fnv => {
            let mut data = Vec::with_capacity(size.div_ceil(8) * 8);
            let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ id;
            while data.len() < size {
                h = h.wrapping_mul(0x0000_0100_0000_01b3);
                data.extend_from_slice(&h.to_be_bytes());
            }
            data.truncate(size);
            data
        }
        ValueGen::Simple => (0..size).map(|j| (id as usize).wrapping_add(j) as u8).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_run(engine: EngineKind, op: Op, dir: PathBuf) -> BenchConfig {
        BenchConfig {
            n: 2_000,
            op,
            report_interval: 0,
            value_size_small: 10,
            value_size_big: 40,
            threads: 3,
            stores: 2,
            engine,
            data_dir: dir,
            ..BenchConfig::default()
        }
    }

    #[test]
    fn write_then_read_log_stores() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path().to_path_buf();

        let report = run(&small_run(EngineKind::Log, Op::RandWrite, dir.clone())).unwrap();
        assert_eq!(report.ops, 2_000);
        assert!(dir.join("bench_simple_0").exists());
        assert!(dir.join("bench_simple_1").exists());

        let report = run(&small_run(EngineKind::Log, Op::RandRead, dir.clone())).unwrap();
        assert_eq!(report.ops, 2_000);

        let db = LogStore::open(dir.join("bench_simple_0")).unwrap();
        assert_eq!(db.len(), 1_000);
        let expected = generate_value(ValueGen::Fnv, 10 + (4 % 30), 4);
        assert_eq!(db.get(&key_for(4)).unwrap(), expected);
    }

    #[test]
    fn read_of_missing_keys_fails() {
        let temp_dir = tempdir().unwrap();
        let config = small_run(EngineKind::Log, Op::Read, temp_dir.path().to_path_buf());

        assert!(run(&config).is_err());
    }

    #[test]
    fn memory_engine_workload() {
        let stores = vec![MemoryEngine::new()];
        let mut config = small_run(EngineKind::Memory, Op::Write, PathBuf::new());
        config.stores = 1;

        run_workload(&stores, &config).unwrap();
        config.op = Op::Read;
        run_workload(&stores, &config).unwrap();

        assert!(stores[0].has(&key_for(1_999)).unwrap());
        assert!(!stores[0].has(&key_for(2_000)).unwrap());
    }

    #[test]
    fn rejects_small_key_space() {
        let config = BenchConfig {
            n: 10,
            key_space: 5,
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BenchConfig {
            n: 10,
            key_space: 20,
            start_key: 3,
            op: Op::Write,
            ..BenchConfig::default()
        };
        let keys = generate_keys(&config);
        assert_eq!(keys.len(), 20);
        assert_eq!(keys[0], 3);
        assert_eq!(keys[19], 22);
    }

    #[test]
    fn keys_are_sha256_of_big_endian_id() {
        let expected: [u8; 32] = [
            0xaf, 0x55, 0x70, 0xf5, 0xa1, 0x81, 0x0b, 0x7a, 0xf7, 0x8c, 0xaf, 0x4b, 0xc7, 0x0a,
            0x66, 0x0f, 0x0d, 0xf5, 0x1e, 0x42, 0xba, 0xf9, 0x1d, 0x4d, 0xe5, 0xb2, 0x32, 0x8d,
            0xe0, 0xe8, 0x3d, 0xfc,
        ];
        assert_eq!(key_for(0), expected);
        assert_ne!(key_for(1), expected);
    }

    // a data file laid out by an earlier writer must be readable by a read run
    #[test]
    fn read_run_over_existing_data_file() {
        let temp_dir = tempdir().unwrap();
        let config = BenchConfig {
            n: 1,
            op: Op::Read,
            threads: 1,
            report_interval: 0,
            data_dir: temp_dir.path().to_path_buf(),
            ..BenchConfig::default()
        };

        let key = key_for(0);
        let value = generate_value(ValueGen::Fnv, 50, 0);
        let mut data = Vec::new();
        data.extend_from_slice(&((key.len() + value.len()) as u32).to_be_bytes());
        data.extend_from_slice(&(key.len() as u32).to_be_bytes());
        data.extend_from_slice(&key);
        data.extend_from_slice(&value);
        std::fs::write(config.store_path(0), &data).unwrap();

        let report = run(&config).unwrap();
        assert_eq!(report.ops, 1);
    }

    #[test]
    fn value_generators() {
        assert_eq!(generate_value(ValueGen::Simple, 4, 254), vec![254, 255, 0, 1]);

        let fnv = generate_value(ValueGen::Fnv, 12, 9);
        assert_eq!(fnv.len(), 12);
        let h1 = (0xcbf2_9ce4_8422_2325u64 ^ 9).wrapping_mul(0x0000_0100_0000_01b3);
        assert_eq!(&fnv[..8], &h1.to_be_bytes());
        assert_eq!(fnv, generate_value(ValueGen::Fnv, 12, 9));
        assert!(generate_value(ValueGen::Fnv, 0, 9).is_empty());
    }
}
