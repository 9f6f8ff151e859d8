use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::stats::ResourceSampler;
use crate::storage::ScanProgress;

/// 周期性资源监控，生命周期绑定到一次搜索会话。
///
/// 只读取计数器与主机指标，不会阻塞扩展引擎；`stop()` 等待任务真正退出后才返回，
/// 因此调用方在搜索结束后再 stop 即可保证不会与收尾并发读取。
pub struct ResourceMonitor {
    shutdown: Arc<Notify>,
    samples: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl ResourceMonitor {
    /// 必须在 tokio runtime 内调用；第一次采样发生在一个周期之后
    pub fn start(progress: ScanProgress, period: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let samples = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(Self::run(
            progress,
            period,
            shutdown.clone(),
            samples.clone(),
        ));
        tracing::debug!("Resource monitor started (every {:?})", period);
        Self {
            shutdown,
            samples,
            handle,
        }
    }

    async fn run(
        progress: ScanProgress,
        period: Duration,
        shutdown: Arc<Notify>,
        samples: Arc<AtomicU64>,
    ) {
        let mut sampler = ResourceSampler::new();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = ticker.tick() => {
                    let report = sampler.sample(&progress);
                    samples.fetch_add(1, Ordering::Relaxed);
                    tracing::info!("\n{}", report);
                }
            }
        }
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// 通知退出并等待任务结束；监控自身的失败只记录，不向搜索传播
    pub async fn stop(self) {
        // notify_one 会保留 permit，即使任务此刻正在采样也不会丢失退出信号
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            tracing::warn!("Resource monitor task ended abnormally: {}", e);
        }
        tracing::debug!("Resource monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn samples_periodically_and_stops_promptly() {
        let progress = ScanProgress::default();
        let monitor = ResourceMonitor::start(progress, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(monitor.samples_taken() >= 1);

        tokio::time::timeout(Duration::from_secs(5), monitor.stop())
            .await
            .expect("monitor did not stop");
    }

    #[tokio::test]
    async fn stop_before_first_tick_takes_no_sample() {
        let monitor = ResourceMonitor::start(ScanProgress::default(), Duration::from_secs(3600));
        let samples = monitor.samples.clone();
        monitor.stop().await;
        assert_eq!(samples.load(Ordering::Relaxed), 0);
    }
}
