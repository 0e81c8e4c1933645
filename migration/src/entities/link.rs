//! 链接实体
//!
//! 行由外部 Web 层创建，本管道只负责累加 total_clicks 和 country_counts。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "links")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub link_id: String,
    pub user_id: String,
    pub click_count: i64,
    /// 国家分布 (JSON: country -> count)
    #[sea_orm(column_type = "Text", nullable)]
    pub country_counts: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
