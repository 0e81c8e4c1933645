//! 事件 outbox
//!
//! 未处理事件的持久暂存区。认领是读取而非出队：claim_batch 不加集合锁、
//! 不删除行，调用方聚合完成后负责 mark_processed。claim 与 mark 之间
//! 崩溃会导致同一事件被下一轮重新处理（至少一次语义，计数只会偏多
//! 不会损坏）。

use async_trait::async_trait;

use crate::events::ClickEvent;

/// 已入库的点击事件（带存储行 ID，mark_processed 用）
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: i64,
    pub event: ClickEvent,
}

/// 事件 outbox 操作
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 追加一条事件（append-only，多生产者并发安全）
    async fn append(&self, event: ClickEvent) -> anyhow::Result<()>;

    /// 认领至多 limit 条未处理事件（processed_at IS NULL）
    async fn claim_batch(&self, limit: u64) -> anyhow::Result<Vec<StoredEvent>>;

    /// 给定行打上处理标记
    async fn mark_processed(&self, ids: &[i64]) -> anyhow::Result<()>;

    /// 删除保留期之外的已处理事件，返回删除行数
    async fn purge_processed(&self, retention_days: u64, batch_size: u64) -> anyhow::Result<u64>;
}
