use std::sync::atomic::{AtomicUsize, Ordering};
use sysinfo::System;

/// 小于该规模的任务串行执行，避免调度开销
const SERIAL_ENTRY_THRESHOLD: usize = 2_048;
const SERIAL_BYTE_THRESHOLD: u64 = 4 * 1024 * 1024;
/// 建索引时每个分块的最小字节数
const MIN_CHUNK_BYTES: u64 = 1024 * 1024;

/// 自适应调度器：根据主机负载决定并行度与批大小
pub struct AdaptiveScheduler {
    target_parallelism: AtomicUsize,
    system: System,
}

impl Default for AdaptiveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveScheduler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            target_parallelism: AtomicUsize::new(num_cpus::get()),
            system: sys,
        }
    }

    /// 固定并行度（配置里显式给了线程数）
    pub fn fixed(threads: usize) -> Self {
        let s = Self::new();
        s.target_parallelism.store(threads.max(1), Ordering::Relaxed);
        s
    }

    pub fn parallelism(&self) -> usize {
        self.target_parallelism.load(Ordering::Relaxed)
    }

    /// 按当前负载与内存压力刷新并行度
    pub fn adjust_parallelism(&mut self) -> usize {
        self.system.refresh_memory();

        let load = System::load_average().one;
        let available = self.system.available_memory();
        let total = self.system.total_memory().max(1);
        let mem_pressure = 1.0 - available as f64 / total as f64;

        let next = target_parallelism(load, num_cpus::get(), mem_pressure);
        let prev = self.target_parallelism.swap(next, Ordering::Relaxed);
        if prev != next {
            tracing::info!(
                "Parallelism {} -> {} (load {:.2}, memory pressure {:.2})",
                prev,
                next,
                load,
                mem_pressure
            );
        }
        next
    }

    /// 根据任务规模选择执行策略
    pub fn select_strategy(&self, task: &Task) -> ExecutionStrategy {
        let workers = self.parallelism().max(1);
        match task {
            Task::IndexBuild { bytes } if *bytes < SERIAL_BYTE_THRESHOLD => ExecutionStrategy::Serial,
            Task::IndexBuild { bytes } => {
                // 每个 worker 4 个分块，便于 work-stealing 均衡长短行
                let chunk = (*bytes / (workers as u64 * 4)).max(MIN_CHUNK_BYTES);
                ExecutionStrategy::Parallel {
                    batch: chunk as usize,
                }
            }
            Task::Expand { entries } if *entries < SERIAL_ENTRY_THRESHOLD => ExecutionStrategy::Serial,
            Task::Expand { entries } => {
                let batch = (*entries / (workers * 16)).clamp(256, 65_536);
                ExecutionStrategy::Parallel { batch }
            }
        }
    }
}

/// 由 1 分钟负载、核数与内存压力（0..=1）推出目标并行度。
///
/// 扩展阶段以 pread 为主：主机空闲时超订到 2 倍核数掩盖 I/O 延迟，
/// 负载或内存吃紧时减半，其余情况每核一个 worker。
pub(crate) fn target_parallelism(load: f64, cpus: usize, mem_pressure: f64) -> usize {
    let cpus = cpus.max(1);
    let per_core_load = load / cpus as f64;
    let n = if per_core_load > 0.8 || mem_pressure > 0.8 {
        cpus / 2
    } else if per_core_load < 0.3 && mem_pressure < 0.5 {
        cpus * 2
    } else {
        cpus
    };
    n.max(1)
}

pub enum Task {
    IndexBuild { bytes: u64 },
    Expand { entries: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Serial,
    /// `batch`：建索引时为分块字节数，扩展时为每批索引条目数
    Parallel { batch: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_tasks_run_serially() {
        let s = AdaptiveScheduler::fixed(4);
        assert_eq!(
            s.select_strategy(&Task::Expand { entries: 10 }),
            ExecutionStrategy::Serial
        );
        assert_eq!(
            s.select_strategy(&Task::IndexBuild { bytes: 1024 }),
            ExecutionStrategy::Serial
        );
    }

    #[test]
    fn parallelism_tracks_load_and_memory() {
        assert_eq!(target_parallelism(0.5, 8, 0.2), 16);
        assert_eq!(target_parallelism(4.0, 8, 0.2), 8);
        assert_eq!(target_parallelism(0.5, 8, 0.6), 8);
        assert_eq!(target_parallelism(7.0, 8, 0.2), 4);
        assert_eq!(target_parallelism(0.0, 8, 0.9), 4);
        // 单核过载也至少保留一个 worker
        assert_eq!(target_parallelism(3.0, 1, 0.9), 1);
        assert_eq!(target_parallelism(0.0, 0, 0.0), 2);
    }

    #[test]
    fn large_expand_is_batched_within_bounds() {
        let s = AdaptiveScheduler::fixed(4);
        match s.select_strategy(&Task::Expand { entries: 4_000_000 }) {
            ExecutionStrategy::Parallel { batch } => {
                assert!((256..=65_536).contains(&batch));
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }
}
