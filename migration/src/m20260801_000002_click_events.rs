//! 点击事件表迁移（outbox 队列）
//!
//! 未处理事件通过 processed_at IS NULL 认领，处理后保留 7 天供排查，
//! 由后台清理任务删除。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::EventId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::LinkId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::Country)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::Source)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::DeviceType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::UserAgent).text().null())
                    .col(
                        ColumnDef::new(ClickEvents::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：event_id（生产端幂等重发时不产生重复行）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_event_id")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 索引：processed_at（认领未处理 / 清理已处理）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_processed_at")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ProcessedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_link_id")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::LinkId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClickEvents {
    Table,
    Id,
    EventId,
    LinkId,
    UserId,
    Country,
    Source,
    DeviceType,
    UserAgent,
    ClickedAt,
    ProcessedAt,
}
