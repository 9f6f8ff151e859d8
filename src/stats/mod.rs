pub mod monitor;

pub use monitor::ResourceMonitor;

use std::fmt;
use std::time::Duration;

use sysinfo::{Pid, System};

use crate::storage::ScanProgress;

/// 一次资源采样（只读已发布的状态，不触碰索引/frontier）
#[derive(Clone, Debug, Default)]
pub struct ResourceSample {
    /// 进程 RSS（sysinfo，失败时回退到 /proc/self/statm）
    pub process_rss_bytes: u64,
    pub used_memory_bytes: u64,
    pub total_memory_bytes: u64,
    /// 全局 CPU 占用（%）
    pub cpu_usage: f32,
    pub load_average_one: f64,
    /// 建索引阶段已扫描的记录数
    pub records_scanned: u64,
    pub uptime: Duration,
}

/// statm 以页计数；sysinfo 拿不到进程信息时才用得上这条回退路径
const STATM_PAGE_BYTES: u64 = 4 * 1024;

/// 解析 statm 第二列（resident 页数）并换算为字节
fn resident_bytes(statm: &str, page_bytes: u64) -> Option<u64> {
    let resident = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    resident.checked_mul(page_bytes)
}

impl ResourceSample {
    /// 从 /proc/self/statm 读取进程 RSS；不可读时为 0
    pub fn read_process_rss() -> u64 {
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|s| resident_bytes(&s, STATM_PAGE_BYTES))
            .unwrap_or(0)
    }
}

/// 采样器：持有 sysinfo 状态，两次采样之间才能得出 CPU 占用
pub struct ResourceSampler {
    system: System,
    pid: Option<Pid>,
    started: std::time::Instant,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Resource monitor cannot resolve own pid: {}", e);
                None
            }
        };
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system,
            pid,
            started: std::time::Instant::now(),
        }
    }

    pub fn sample(&mut self, progress: &ScanProgress) -> ResourceSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let rss = self
            .pid
            .filter(|pid| self.system.refresh_process(*pid))
            .and_then(|pid| self.system.process(pid))
            .map(|p| p.memory())
            .filter(|m| *m > 0)
            .unwrap_or_else(ResourceSample::read_process_rss);

        ResourceSample {
            process_rss_bytes: rss,
            used_memory_bytes: self.system.used_memory(),
            total_memory_bytes: self.system.total_memory(),
            cpu_usage: self.system.global_cpu_info().cpu_usage(),
            load_average_one: System::load_average().one,
            records_scanned: progress.scanned_count(),
            uptime: self.started.elapsed(),
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

impl fmt::Display for ResourceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           cite-tier Resource Report              ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(
            f,
            "║ Process RSS:  {:>34} ║",
            human_bytes(self.process_rss_bytes)
        )?;
        writeln!(
            f,
            "║ Host memory:  {:>16} / {:>15} ║",
            human_bytes(self.used_memory_bytes),
            human_bytes(self.total_memory_bytes)
        )?;
        writeln!(f, "║ CPU usage:    {:>33.1}% ║", self.cpu_usage)?;
        writeln!(f, "║ Load (1m):    {:>34.2} ║", self.load_average_one)?;
        writeln!(f, "║ Lines read:   {:>34} ║", self.records_scanned)?;
        writeln!(f, "║ Uptime:       {:>34} ║", format!("{:.0?}", self.uptime))?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
