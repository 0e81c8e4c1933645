//! 数据清理任务
//!
//! 删除保留期之外的已处理事件，防止 outbox 无限增长。
//! 汇总表不在清理范围内（由聚合路径只增不删）。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::{error, info};

use crate::config::get_config;
use crate::outbox::EventStore;
use crate::storage::SeaOrmStorage;

/// 清理报告
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// 删除的已处理事件数量
    pub processed_events_deleted: u64,
}

/// 已处理事件清理任务
pub struct RetentionTask {
    storage: Arc<SeaOrmStorage>,
    /// 已处理事件保留天数
    retention_days: u64,
    /// 每次删除批量大小
    batch_size: u64,
}

impl RetentionTask {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let config = get_config();

        Self {
            storage,
            retention_days: config.retention.processed_event_days,
            batch_size: config.retention.purge_batch_size,
        }
    }

    /// 运行一次完整的清理流程
    pub async fn run_cleanup(&self) -> anyhow::Result<CleanupReport> {
        let deleted = self
            .storage
            .purge_processed(self.retention_days, self.batch_size)
            .await?;

        info!(
            "Outbox cleanup completed: {} processed events deleted (retention: {} days)",
            deleted, self.retention_days
        );

        Ok(CleanupReport {
            processed_events_deleted: deleted,
        })
    }

    /// 启动后台清理任务
    ///
    /// 每隔指定时间运行一次清理
    pub fn spawn_background_task(self: Arc<Self>, interval_hours: u64) {
        tokio::spawn(async move {
            let interval = StdDuration::from_secs(interval_hours * 60 * 60);

            // 首次运行延迟 5 分钟
            tokio::time::sleep(StdDuration::from_secs(300)).await;

            loop {
                if let Err(e) = self.run_cleanup().await {
                    error!("Outbox cleanup task failed: {}", e);
                }

                tokio::time::sleep(interval).await;
            }
        });

        info!(
            "Outbox cleanup background task started (interval: {} hours)",
            interval_hours
        );
    }
}
