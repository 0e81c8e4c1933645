//! 月级点击汇总实体

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_rollups_monthly")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub link_id: String,
    /// 月份键，格式 YYYY-MM（UTC）
    pub month_bucket: String,
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
