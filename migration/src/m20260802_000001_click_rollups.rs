//! 点击汇总表迁移
//!
//! 创建预聚合的汇总表，供报表层直接读取：
//! - click_rollups_daily: 天级链接点击汇总
//! - click_rollups_monthly: 月级链接点击汇总
//! - global_clicks: 全平台点击计数单例

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. 创建 click_rollups_daily 表
        manager
            .create_table(
                Table::create()
                    .table(ClickRollupsDaily::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickRollupsDaily::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickRollupsDaily::LinkId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickRollupsDaily::DayBucket).date().not_null())
                    .col(
                        ColumnDef::new(ClickRollupsDaily::ClickCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ClickRollupsDaily::CountryCounts).text().null())
                    .col(ColumnDef::new(ClickRollupsDaily::SourceCounts).text().null())
                    .col(ColumnDef::new(ClickRollupsDaily::DeviceCounts).text().null())
                    .to_owned(),
            )
            .await?;

        // 唯一索引：link_id + day_bucket
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rollups_daily_link_bucket")
                    .table(ClickRollupsDaily::Table)
                    .col(ClickRollupsDaily::LinkId)
                    .col(ClickRollupsDaily::DayBucket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 索引：day_bucket（范围查询和趋势比较）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rollups_daily_bucket")
                    .table(ClickRollupsDaily::Table)
                    .col(ClickRollupsDaily::DayBucket)
                    .to_owned(),
            )
            .await?;

        // 2. 创建 click_rollups_monthly 表
        manager
            .create_table(
                Table::create()
                    .table(ClickRollupsMonthly::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickRollupsMonthly::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickRollupsMonthly::LinkId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickRollupsMonthly::MonthBucket)
                            .string_len(7)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickRollupsMonthly::ClickCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ClickRollupsMonthly::CountryCounts).text().null())
                    .col(ColumnDef::new(ClickRollupsMonthly::SourceCounts).text().null())
                    .col(ColumnDef::new(ClickRollupsMonthly::DeviceCounts).text().null())
                    .to_owned(),
            )
            .await?;

        // 唯一索引：link_id + month_bucket
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rollups_monthly_link_bucket")
                    .table(ClickRollupsMonthly::Table)
                    .col(ClickRollupsMonthly::LinkId)
                    .col(ClickRollupsMonthly::MonthBucket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 3. 创建 global_clicks 单例表
        manager
            .create_table(
                Table::create()
                    .table(GlobalClicks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GlobalClicks::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GlobalClicks::TotalClicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GlobalClicks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClickRollupsMonthly::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClickRollupsDaily::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClickRollupsDaily {
    Table,
    Id,
    LinkId,
    DayBucket,
    ClickCount,
    CountryCounts,
    SourceCounts,
    DeviceCounts,
}

#[derive(DeriveIden)]
enum ClickRollupsMonthly {
    Table,
    Id,
    LinkId,
    MonthBucket,
    ClickCount,
    CountryCounts,
    SourceCounts,
    DeviceCounts,
}

#[derive(DeriveIden)]
enum GlobalClicks {
    Table,
    Id,
    TotalClicks,
}
