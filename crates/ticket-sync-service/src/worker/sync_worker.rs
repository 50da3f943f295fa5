//! 轮询对账后台 Worker
//!
//! 按固定间隔对全部平台关联运行一轮 [`PollingJob`]，收到停机信号后在
//! 当前页处理完成时退出，断点保留到下次启动。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::sync::PollingJob;

pub struct SyncWorker {
    job: Arc<PollingJob>,
    poll_interval: Duration,
}

impl SyncWorker {
    pub fn new(job: Arc<PollingJob>, poll_interval_secs: u64) -> Self {
        Self {
            job,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    /// 主循环：启动后立即运行一轮，之后按间隔运行，直到收到 shutdown 信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.poll_interval,
            platforms = ?self.job.platforms(),
            "SyncWorker 已启动"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let run = self.job.run_all(&shutdown).await;
            let discrepancies = run
                .reports
                .iter()
                .filter(|r| r.discrepancy.is_some())
                .count();
            info!(
                links = run.reports.len(),
                failed_links = run.failed_links.len(),
                unlinked_events = run.unlinked_events.len(),
                discrepancies,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "本轮同步完成"
            );
            if !run.failed_links.is_empty() {
                warn!(failed = ?run.failed_links, "部分平台活动同步失败，下轮重试");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    // 发送端已释放同样视为停机；信号值在循环开头检查
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("SyncWorker 已停止");
    }
}
