use bytebufferpool::bufferpool::{ByteBufferPool, PoolError, PoolStats};
use bytebufferpool::config::PoolConfig;
use rand::Rng;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("cannot create scratch directory {}: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Standalone workload runner for the buffer pool.
///
/// Usage: `benchmark_runner [POOL_CONFIG_JSON] [--json]`
///
/// With a config file, runs the mixed workload once against that pool.
/// Otherwise runs the built-in suite against pools in a temp directory.
fn main() -> Result<(), RunnerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let config_path = args.iter().find(|a| !a.starts_with("--")).map(PathBuf::from);

    println!("ByteBufferPool Workload Benchmark");
    println!("=================================\n");

    let scratch = std::env::temp_dir().join(format!("bytebufferpool-bench-{}", std::process::id()));
    let results = match config_path {
        Some(path) => {
            let pool_config = PoolConfig::from_json_file(&path)?;
            let workload = WorkloadConfig {
                name: "custom",
                threads: 8,
                ops_per_thread: 20_000,
                file_request_ratio: 0.5,
                max_hold_micros: 20,
                pool: pool_config,
            };
            vec![run_workload(&workload)?]
        }
        None => {
            let suite = Workloads::new(&scratch);
            suite.run()?
        }
    };
    let _ = std::fs::remove_dir_all(&scratch);

    if json {
        let out = serde_json::to_string_pretty(&results)?;
        println!("{out}");
    } else {
        println!("{}", generate_report(&results));
    }
    Ok(())
}

/// One workload: a pool shape plus how threads use it.
#[derive(Clone)]
pub struct WorkloadConfig {
    pub name: &'static str,
    pub threads: usize,
    pub ops_per_thread: usize,
    // fraction of acquires asking for the file tier
    pub file_request_ratio: f64,
    // each buffer is held for a random time up to this
    pub max_hold_micros: u64,
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadResult {
    pub name: String,
    pub threads: usize,
    pub memory_blocks: usize,
    pub file_blocks: usize,
    pub blocking_mode: bool,
    pub total_operations: usize,
    pub no_buffer: usize,
    pub elapsed_nanos: u128,
    pub stats: PoolStats,
}

impl WorkloadResult {
    pub fn operations_per_second(&self) -> f64 {
        if self.elapsed_nanos == 0 {
            0.0
        } else {
            self.total_operations as f64 / (self.elapsed_nanos as f64 / 1_000_000_000.0)
        }
    }

    fn pct(&self, n: u64) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            n as f64 * 100.0 / self.total_operations as f64
        }
    }

    pub fn primary_hit_pct(&self) -> f64 {
        self.pct(self.stats.primary_hits)
    }

    pub fn fallback_pct(&self) -> f64 {
        self.pct(self.stats.fallbacks)
    }

    pub fn overflow_pct(&self) -> f64 {
        self.pct(self.stats.overflows)
    }
}

pub struct Workloads {
    scratch: PathBuf,
    configs: Vec<WorkloadConfig>,
}

impl Workloads {
    pub fn new(scratch: &std::path::Path) -> Self {
        let pool = |memory_blocks: usize, file_blocks: usize, blocking: bool, name: &str| {
            PoolConfig::new()
                .memory_capacity(memory_blocks * 1024)
                .file_capacity(file_blocks * 2048)
                .backing_file(scratch.join(format!("{name}.dat")))
                .blocking_mode(blocking)
        };
        let configs = vec![
            WorkloadConfig {
                name: "ample_memory_only",
                threads: 8,
                ops_per_thread: 20_000,
                file_request_ratio: 0.0,
                max_hold_micros: 0,
                pool: pool(256, 0, false, "ample_memory_only"),
            },
            WorkloadConfig {
                name: "mixed_tiers",
                threads: 8,
                ops_per_thread: 20_000,
                file_request_ratio: 0.5,
                max_hold_micros: 10,
                pool: pool(32, 32, false, "mixed_tiers"),
            },
            WorkloadConfig {
                name: "scarce_overflow",
                threads: 16,
                ops_per_thread: 10_000,
                file_request_ratio: 0.3,
                max_hold_micros: 20,
                pool: pool(4, 4, false, "scarce_overflow"),
            },
            WorkloadConfig {
                name: "scarce_blocking",
                threads: 16,
                ops_per_thread: 10_000,
                file_request_ratio: 0.3,
                max_hold_micros: 20,
                pool: pool(4, 4, true, "scarce_blocking"),
            },
        ];
        Workloads {
            scratch: scratch.to_path_buf(),
            configs,
        }
    }

    pub fn run(&self) -> Result<Vec<WorkloadResult>, RunnerError> {
        std::fs::create_dir_all(&self.scratch).map_err(|source| RunnerError::Scratch {
            path: self.scratch.clone(),
            source,
        })?;
        let mut results = Vec::new();
        for (idx, config) in self.configs.iter().enumerate() {
            print!("Running workload {}/{}: {} ... ", idx + 1, self.configs.len(), config.name);
            let _ = std::io::stdout().flush();
            let result = run_workload(config)?;
            println!(
                "Ops/sec: {:.0}, overflow: {:.1}%",
                result.operations_per_second(),
                result.overflow_pct()
            );
            results.push(result);
        }
        println!();
        Ok(results)
    }
}

pub fn run_workload(config: &WorkloadConfig) -> Result<WorkloadResult, PoolError> {
    let pool = Arc::new(ByteBufferPool::from_config(&config.pool)?);
    info!(workload = config.name, threads = config.threads, "starting workload");

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let config = config.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut no_buffer = 0usize;
                for op in 0..config.ops_per_thread {
                    let buf = if rng.gen_bool(config.file_request_ratio) {
                        pool.acquire_file_buffer()
                    } else {
                        pool.acquire_memory_buffer()
                    };
                    let Some(mut buf) = buf else {
                        no_buffer += 1;
                        continue;
                    };
                    // every block is at least 1024 bytes
                    buf.as_mut_slice()[..8].copy_from_slice(&(op as u64).to_le_bytes());
                    if config.max_hold_micros > 0 {
                        let hold = rng.gen_range(0..=config.max_hold_micros);
                        thread::sleep(Duration::from_micros(hold));
                    }
                    pool.release(buf);
                }
                no_buffer
            })
        })
        .collect();

    let no_buffer = handles.into_iter().map(|h| h.join().expect("worker panicked")).sum();
    let elapsed = start.elapsed();

    Ok(WorkloadResult {
        name: config.name.to_string(),
        threads: config.threads,
        memory_blocks: pool.memory_block_count(),
        file_blocks: pool.file_block_count(),
        blocking_mode: pool.is_blocking_mode(),
        total_operations: config.threads * config.ops_per_thread,
        no_buffer,
        elapsed_nanos: elapsed.as_nanos(),
        stats: pool.stats(),
    })
}

pub fn generate_report(results: &[WorkloadResult]) -> String {
    let mut report = String::new();
    report.push_str("# Buffer Pool Workload Analysis\n\n");
    report.push_str("| Workload | Threads | Mem/File Blocks | Blocking | Ops/sec | Primary | Fallback | Overflow | Waits |\n");
    report.push_str("|----------|---------|-----------------|----------|---------|---------|----------|----------|-------|\n");
    for r in results {
        report.push_str(&format!(
            "| {} | {} | {}/{} | {} | {:.0} | {:.1}% | {:.1}% | {:.1}% | {} |\n",
            r.name,
            r.threads,
            r.memory_blocks,
            r.file_blocks,
            r.blocking_mode,
            r.operations_per_second(),
            r.primary_hit_pct(),
            r.fallback_pct(),
            r.overflow_pct(),
            r.stats.waits
        ));
    }
    report
}
