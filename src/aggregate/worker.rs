//! 聚合批次 worker
//!
//! 批处理作业，不是常驻服务：外部调度器（cron 或 drain 循环）反复调用
//! run_batch，每次调用同步完成一个批次。认领到落库到打标全程顺序 await，
//! 只有三个互不相交的写入目标（链接计数 / 天汇总 / 月汇总）并发执行。
//!
//! 故障语义：任何落库失败都在 mark_processed 之前中止，事件留在
//! outbox 里等下一轮重新认领。已成功的子阶段不回滚，重试时会被再次
//! 累加——可接受的至少一次偏差，换来无需跨表事务。

use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{debug, info};

use super::accumulator::aggregate_events;
use super::rollup::RollupWriter;
use crate::events::ClickEvent;
use crate::outbox::EventStore;
use crate::storage::SeaOrmStorage;

/// 一次批处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// 本批处理的事件数
    pub processed: usize,
}

/// 聚合 worker
pub struct AggregationWorker {
    storage: Arc<SeaOrmStorage>,
}

impl AggregationWorker {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 处理一个批次
    ///
    /// 1. 认领至多 batch_size 条未处理事件
    /// 2. 空批直接返回（稳态下的正常情况）
    /// 3. 内存单遍聚合
    /// 4. 分块批量落库（链接 / 天 / 月 / 全局）
    /// 5. 全部成功后打处理标记
    pub async fn run_batch(
        &self,
        batch_size: u64,
        chunk_size: usize,
    ) -> anyhow::Result<BatchOutcome> {
        let claimed = self.storage.claim_batch(batch_size).await?;
        if claimed.is_empty() {
            debug!("No unprocessed events, batch is a no-op");
            return Ok(BatchOutcome { processed: 0 });
        }

        let ids: Vec<i64> = claimed.iter().map(|s| s.id).collect();
        let events: Vec<ClickEvent> = claimed.into_iter().map(|s| s.event).collect();

        self.apply_events(&events, chunk_size).await?;

        // 落库成功后才打标；这之前崩溃则下一轮重新认领（至少一次）
        self.storage.mark_processed(&ids).await?;

        info!(
            "Aggregation batch completed: {} events, {} links",
            events.len(),
            events
                .iter()
                .map(|e| e.link_id.as_str())
                .collect::<std::collections::HashSet<_>>()
                .len()
        );

        Ok(BatchOutcome {
            processed: events.len(),
        })
    }

    /// 聚合并落库一组事件（outbox worker 与消息流消费端共用）
    pub async fn apply_events(
        &self,
        events: &[ClickEvent],
        chunk_size: usize,
    ) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let agg = aggregate_events(events);
        let writer = RollupWriter::new(
            self.storage.get_db(),
            self.storage.retry_config(),
            chunk_size,
        );

        // 三个写入目标落在不相交的表上，可以并发
        tokio::try_join!(
            writer.increment_link_counters(&agg.by_link),
            writer.upsert_daily(&agg.daily),
            writer.upsert_monthly(&agg.monthly),
        )?;

        writer.increment_global(agg.total).await?;
        Ok(())
    }

    /// 连续处理直到队列排空（积压恢复场景）
    pub async fn drain(
        &self,
        batch_size: u64,
        chunk_size: usize,
        pause: Duration,
    ) -> anyhow::Result<usize> {
        let mut total = 0usize;
        loop {
            let outcome = self.run_batch(batch_size, chunk_size).await?;
            if outcome.processed == 0 {
                break;
            }
            total += outcome.processed;

            // 批次之间稍作间歇，给生产端写入让路
            if !pause.is_zero() {
                sleep(pause).await;
            }
        }

        if total > 0 {
            info!("Outbox drained: {} events total", total);
        }
        Ok(total)
    }
}
