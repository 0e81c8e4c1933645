//! 点击事件实体（outbox 队列）

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 生产端分配的事件 ID（UUID v4）
    pub event_id: String,
    pub link_id: String,
    pub user_id: String,
    pub country: String,
    pub source: String,
    pub device_type: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    /// 事件时间（点击发生时刻，不是入库时刻）
    pub clicked_at: DateTimeUtc,
    /// 处理标记；NULL 表示尚未被聚合
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
