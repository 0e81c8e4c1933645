//! 天级点击汇总实体

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_rollups_daily")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub link_id: String,
    /// UTC 日历天（取自事件自身的时间戳）
    pub day_bucket: Date,
    pub click_count: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub country_counts: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub source_counts: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub device_counts: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
