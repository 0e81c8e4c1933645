//! EventStore implementation for SeaOrmStorage
//!
//! Outbox semantics: append is a plain insert, claim is a filtered read
//! (no destructive dequeue, no collection lock), mark sets processed_at,
//! purge deletes processed rows past the retention window in batches.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::SeaOrmStorage;
use super::retry;
use crate::events::ClickEvent;
use crate::outbox::{EventStore, StoredEvent};

use migration::entities::click_event;

/// mark_processed 单条 SQL 覆盖的最大行数
const MARK_CHUNK_SIZE: usize = 1000;

fn model_to_stored(model: click_event::Model) -> StoredEvent {
    StoredEvent {
        id: model.id,
        event: ClickEvent {
            event_id: Uuid::parse_str(&model.event_id).unwrap_or_else(|_| Uuid::nil()),
            link_id: model.link_id,
            user_id: model.user_id,
            country: model.country,
            source: model.source,
            device_type: model.device_type.parse().unwrap_or_default(),
            user_agent: model.user_agent,
            timestamp: model.clicked_at,
        },
    }
}

fn event_to_active_model(event: ClickEvent) -> click_event::ActiveModel {
    click_event::ActiveModel {
        event_id: Set(event.event_id.to_string()),
        link_id: Set(event.link_id),
        user_id: Set(event.user_id),
        country: Set(event.country),
        source: Set(event.source),
        device_type: Set(event.device_type.to_string()),
        user_agent: Set(event.user_agent),
        clicked_at: Set(event.timestamp),
        processed_at: Set(None),
        ..Default::default()
    }
}

#[async_trait]
impl EventStore for SeaOrmStorage {
    async fn append(&self, event: ClickEvent) -> anyhow::Result<()> {
        let event_id = event.event_id;
        let model = event_to_active_model(event);

        // event_id 唯一索引 + DO NOTHING：生产端重发不会产生重复行
        let db = self.get_db();
        let result = retry::with_retry("append_click_event", self.retry_config(), || async {
            click_event::Entity::insert(model.clone())
                .on_conflict(
                    OnConflict::column(click_event::Column::EventId)
                        .do_nothing()
                        .to_owned(),
                )
                .exec(db)
                .await
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            // 冲突时没有行被插入，SeaORM 以 RecordNotInserted 表达，视为成功
            Err(DbErr::RecordNotInserted) => {
                debug!("Click event {} already in outbox, skipped", event_id);
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("Failed to append click event: {}", e)),
        }
    }

    async fn claim_batch(&self, limit: u64) -> anyhow::Result<Vec<StoredEvent>> {
        let db = self.get_db();
        let models = retry::with_retry("claim_batch", self.retry_config(), || async {
            click_event::Entity::find()
                .filter(click_event::Column::ProcessedAt.is_null())
                .order_by_asc(click_event::Column::Id)
                .limit(limit)
                .all(db)
                .await
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to claim event batch: {}", e))?;

        Ok(models.into_iter().map(model_to_stored).collect())
    }

    async fn mark_processed(&self, ids: &[i64]) -> anyhow::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let db = self.get_db();

        for chunk in ids.chunks(MARK_CHUNK_SIZE) {
            retry::with_retry("mark_processed", self.retry_config(), || async {
                click_event::Entity::update_many()
                    .col_expr(click_event::Column::ProcessedAt, Expr::value(now))
                    .filter(click_event::Column::Id.is_in(chunk.iter().copied()))
                    .exec(db)
                    .await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to mark events processed: {}", e))?;
        }

        debug!("Marked {} events processed", ids.len());
        Ok(())
    }

    async fn purge_processed(&self, retention_days: u64, batch_size: u64) -> anyhow::Result<u64> {
        let db = self.get_db();
        let cutoff = Utc::now() - Duration::days(retention_days as i64);

        let mut total_deleted = 0u64;
        let mut iterations = 0;
        let max_iterations = 1000; // 防止无限循环

        loop {
            if iterations >= max_iterations {
                warn!(
                    "Processed-event purge reached max iterations {} (deleted {} rows)",
                    max_iterations, total_deleted
                );
                break;
            }

            // 查找要删除的 ID 列表
            let ids_to_delete: Vec<i64> = click_event::Entity::find()
                .select_only()
                .column(click_event::Column::Id)
                .filter(click_event::Column::ProcessedAt.lt(cutoff))
                .order_by_asc(click_event::Column::Id)
                .limit(batch_size)
                .into_tuple()
                .all(db)
                .await?;

            if ids_to_delete.is_empty() {
                break;
            }

            // 批量删除
            let deleted = click_event::Entity::delete_many()
                .filter(click_event::Column::Id.is_in(ids_to_delete.clone()))
                .exec(db)
                .await?
                .rows_affected;

            total_deleted += deleted;
            iterations += 1;

            debug!(
                "Purge batch {}: deleted {} rows (total {})",
                iterations, deleted, total_deleted
            );

            // 如果删除的数量小于批量大小，说明已经没有更多数据
            if deleted < batch_size {
                break;
            }

            // 短暂暂停，避免对数据库造成过大压力
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        Ok(total_deleted)
    }
}
