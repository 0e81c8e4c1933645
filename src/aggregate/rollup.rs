//! 汇总写入器
//!
//! 封装聚合结果的批量落库逻辑，供 outbox worker 和消息流消费端共用。
//! 计数列一律用 `col = col + delta` 的原子加法表达式；JSON 分布列无法在
//! SQL 里合并，批内先读出现有行在内存合并后用 CASE WHEN 批量写回。
//! 所有写入按 chunk_size 分块，避免单条 SQL 超出存储端限制。

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseBackend, DbErr, EntityTrait,
    ExprTrait, QueryFilter,
    sea_query::{CaseStatement, Expr, OnConflict, Query, SimpleExpr},
};
use tracing::{debug, warn};

use super::{ClickAggregation, parse_json_counts, to_json_string};
use crate::storage::backend::retry::{self, RetryConfig};
use migration::entities::{click_rollup_daily, click_rollup_monthly, global_clicks, link};

/// 全局计数单例的固定主键
const GLOBAL_ROW_ID: i32 = 1;

/// 汇总写入器
pub struct RollupWriter<'a, C: ConnectionTrait> {
    db: &'a C,
    retry_config: RetryConfig,
    chunk_size: usize,
}

impl<'a, C: ConnectionTrait> RollupWriter<'a, C> {
    pub fn new(db: &'a C, retry_config: RetryConfig, chunk_size: usize) -> Self {
        Self {
            db,
            retry_config,
            chunk_size: chunk_size.max(1),
        }
    }

    // ============ 链接计数 ============

    /// 批量累加各链接的 click_count 和 country_counts
    ///
    /// 链接行由外部 Web 层创建；事件指向的链接若已被删除，
    /// 该条更新会被跳过并记日志，不影响同批其它链接。
    pub async fn increment_link_counters(
        &self,
        by_link: &HashMap<String, ClickAggregation>,
    ) -> anyhow::Result<()> {
        if by_link.is_empty() {
            return Ok(());
        }

        let entries: Vec<(&String, &ClickAggregation)> = by_link.iter().collect();
        for chunk in entries.chunks(self.chunk_size) {
            retry::with_retry("rollup_link_counters", self.retry_config, || async {
                self.apply_link_chunk(chunk).await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bulk update link counters: {}", e))?;
        }

        debug!("Link counters updated: {} links", by_link.len());
        Ok(())
    }

    async fn apply_link_chunk(
        &self,
        chunk: &[(&String, &ClickAggregation)],
    ) -> Result<(), DbErr> {
        let by_id: HashMap<&str, &ClickAggregation> =
            chunk.iter().map(|(k, v)| (k.as_str(), *v)).collect();

        let existing = link::Entity::find()
            .filter(link::Column::LinkId.is_in(by_id.keys().copied()))
            .all(self.db)
            .await?;

        if existing.len() < chunk.len() {
            warn!(
                "Link counter pass: {} of {} link ids unknown, skipped",
                chunk.len() - existing.len(),
                chunk.len()
            );
        }
        if existing.is_empty() {
            return Ok(());
        }

        let mut row_ids: Vec<i64> = Vec::with_capacity(existing.len());
        let mut click_count_case = CaseStatement::new();
        let mut country_counts_case = CaseStatement::new();

        for record in &existing {
            let Some(agg) = by_id.get(record.link_id.as_str()) else {
                continue;
            };
            row_ids.push(record.id);
            let id_cond = link::Column::Id.eq(record.id);

            // 计数：原子加法表达式
            click_count_case = click_count_case.case(
                id_cond.clone(),
                Expr::col(link::Column::ClickCount).add(Expr::val(agg.count as i64)),
            );

            // 国家分布：内存合并后整列写回
            let mut merged = parse_json_counts(&record.country_counts);
            for (k, v) in &agg.countries {
                *merged.entry(k.clone()).or_insert(0) += v;
            }
            country_counts_case = country_counts_case.case(
                id_cond,
                SimpleExpr::Value(to_json_string(&merged).into()),
            );
        }

        // 不匹配的保持原值
        click_count_case = click_count_case.finally(Expr::col(link::Column::ClickCount));
        country_counts_case =
            country_counts_case.finally(Expr::col(link::Column::CountryCounts));

        let stmt = Query::update()
            .table(link::Entity)
            .value(link::Column::ClickCount, click_count_case)
            .value(link::Column::CountryCounts, country_counts_case)
            .and_where(Expr::col(link::Column::Id).is_in(row_ids))
            .to_owned();

        self.db.execute(&stmt).await?;
        Ok(())
    }

    // ============ 天汇总 ============

    /// upsert-increment 天汇总：不存在则创建，存在则累加
    pub async fn upsert_daily(
        &self,
        daily: &HashMap<(String, NaiveDate), ClickAggregation>,
    ) -> anyhow::Result<()> {
        if daily.is_empty() {
            return Ok(());
        }

        let entries: Vec<(&(String, NaiveDate), &ClickAggregation)> = daily.iter().collect();
        for chunk in entries.chunks(self.chunk_size) {
            self.apply_daily_chunk(chunk).await?;
        }

        debug!("Daily rollups updated: {} buckets", daily.len());
        Ok(())
    }

    async fn apply_daily_chunk(
        &self,
        chunk: &[(&(String, NaiveDate), &ClickAggregation)],
    ) -> anyhow::Result<()> {
        // 批量读取现有行，避免 N+1 查询
        let link_ids: HashSet<&str> = chunk.iter().map(|((l, _), _)| l.as_str()).collect();
        let buckets: HashSet<NaiveDate> = chunk.iter().map(|((_, d), _)| *d).collect();

        let existing = click_rollup_daily::Entity::find()
            .filter(click_rollup_daily::Column::LinkId.is_in(link_ids))
            .filter(click_rollup_daily::Column::DayBucket.is_in(buckets))
            .all(self.db)
            .await?;

        let existing_map: HashMap<(String, NaiveDate), click_rollup_daily::Model> = existing
            .into_iter()
            .map(|r| ((r.link_id.clone(), r.day_bucket), r))
            .collect();

        // 分离新增和更新
        let mut to_insert: Vec<click_rollup_daily::ActiveModel> = Vec::new();
        let mut to_update: Vec<RollupUpdate> = Vec::new();

        for ((link_id, day), agg) in chunk {
            if let Some(record) = existing_map.get(&((*link_id).clone(), *day)) {
                to_update.push(RollupUpdate::merged(
                    record.id,
                    agg,
                    &record.country_counts,
                    &record.source_counts,
                    &record.device_counts,
                ));
            } else {
                to_insert.push(click_rollup_daily::ActiveModel {
                    link_id: Set((*link_id).clone()),
                    day_bucket: Set(*day),
                    click_count: Set(agg.count as i64),
                    country_counts: Set(Some(to_json_string(&agg.countries))),
                    source_counts: Set(Some(to_json_string(&agg.sources))),
                    device_counts: Set(Some(to_json_string(&agg.devices))),
                    ..Default::default()
                });
            }
        }

        if !to_insert.is_empty() {
            retry::with_retry("rollup_insert_daily", self.retry_config, || async {
                click_rollup_daily::Entity::insert_many(to_insert.clone())
                    .exec(self.db)
                    .await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to insert daily rollups: {}", e))?;
        }

        if !to_update.is_empty() {
            retry::with_retry("rollup_update_daily", self.retry_config, || async {
                self.batch_update_daily(&to_update).await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to update daily rollups: {}", e))?;
        }

        Ok(())
    }

    /// 使用 CASE WHEN 批量更新 daily 记录
    async fn batch_update_daily(&self, records: &[RollupUpdate]) -> Result<(), DbErr> {
        if records.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();

        let mut click_count_case = CaseStatement::new();
        let mut country_case = CaseStatement::new();
        let mut source_case = CaseStatement::new();
        let mut device_case = CaseStatement::new();

        for record in records {
            let id_cond = click_rollup_daily::Column::Id.eq(record.id);

            click_count_case = click_count_case.case(
                id_cond.clone(),
                Expr::col(click_rollup_daily::Column::ClickCount)
                    .add(Expr::val(record.click_delta)),
            );
            country_case = country_case.case(
                id_cond.clone(),
                SimpleExpr::Value(record.country_counts.clone().into()),
            );
            source_case = source_case.case(
                id_cond.clone(),
                SimpleExpr::Value(record.source_counts.clone().into()),
            );
            device_case = device_case.case(
                id_cond,
                SimpleExpr::Value(record.device_counts.clone().into()),
            );
        }

        click_count_case =
            click_count_case.finally(Expr::col(click_rollup_daily::Column::ClickCount));
        country_case = country_case.finally(Expr::col(click_rollup_daily::Column::CountryCounts));
        source_case = source_case.finally(Expr::col(click_rollup_daily::Column::SourceCounts));
        device_case = device_case.finally(Expr::col(click_rollup_daily::Column::DeviceCounts));

        let stmt = Query::update()
            .table(click_rollup_daily::Entity)
            .value(click_rollup_daily::Column::ClickCount, click_count_case)
            .value(click_rollup_daily::Column::CountryCounts, country_case)
            .value(click_rollup_daily::Column::SourceCounts, source_case)
            .value(click_rollup_daily::Column::DeviceCounts, device_case)
            .and_where(Expr::col(click_rollup_daily::Column::Id).is_in(ids))
            .to_owned();

        self.db.execute(&stmt).await?;
        Ok(())
    }

    // ============ 月汇总 ============

    /// upsert-increment 月汇总，与天汇总同构，键为 YYYY-MM
    pub async fn upsert_monthly(
        &self,
        monthly: &HashMap<(String, String), ClickAggregation>,
    ) -> anyhow::Result<()> {
        if monthly.is_empty() {
            return Ok(());
        }

        let entries: Vec<(&(String, String), &ClickAggregation)> = monthly.iter().collect();
        for chunk in entries.chunks(self.chunk_size) {
            self.apply_monthly_chunk(chunk).await?;
        }

        debug!("Monthly rollups updated: {} buckets", monthly.len());
        Ok(())
    }

    async fn apply_monthly_chunk(
        &self,
        chunk: &[(&(String, String), &ClickAggregation)],
    ) -> anyhow::Result<()> {
        let link_ids: HashSet<&str> = chunk.iter().map(|((l, _), _)| l.as_str()).collect();
        let buckets: HashSet<&str> = chunk.iter().map(|((_, m), _)| m.as_str()).collect();

        let existing = click_rollup_monthly::Entity::find()
            .filter(click_rollup_monthly::Column::LinkId.is_in(link_ids))
            .filter(click_rollup_monthly::Column::MonthBucket.is_in(buckets))
            .all(self.db)
            .await?;

        let existing_map: HashMap<(String, String), click_rollup_monthly::Model> = existing
            .into_iter()
            .map(|r| ((r.link_id.clone(), r.month_bucket.clone()), r))
            .collect();

        let mut to_insert: Vec<click_rollup_monthly::ActiveModel> = Vec::new();
        let mut to_update: Vec<RollupUpdate> = Vec::new();

        for ((link_id, month), agg) in chunk {
            if let Some(record) = existing_map.get(&((*link_id).clone(), (*month).clone())) {
                to_update.push(RollupUpdate::merged(
                    record.id,
                    agg,
                    &record.country_counts,
                    &record.source_counts,
                    &record.device_counts,
                ));
            } else {
                to_insert.push(click_rollup_monthly::ActiveModel {
                    link_id: Set((*link_id).clone()),
                    month_bucket: Set((*month).clone()),
                    click_count: Set(agg.count as i64),
                    country_counts: Set(Some(to_json_string(&agg.countries))),
                    source_counts: Set(Some(to_json_string(&agg.sources))),
                    device_counts: Set(Some(to_json_string(&agg.devices))),
                    ..Default::default()
                });
            }
        }

        if !to_insert.is_empty() {
            retry::with_retry("rollup_insert_monthly", self.retry_config, || async {
                click_rollup_monthly::Entity::insert_many(to_insert.clone())
                    .exec(self.db)
                    .await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to insert monthly rollups: {}", e))?;
        }

        if !to_update.is_empty() {
            retry::with_retry("rollup_update_monthly", self.retry_config, || async {
                self.batch_update_monthly(&to_update).await
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to update monthly rollups: {}", e))?;
        }

        Ok(())
    }

    /// 使用 CASE WHEN 批量更新 monthly 记录
    async fn batch_update_monthly(&self, records: &[RollupUpdate]) -> Result<(), DbErr> {
        if records.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();

        let mut click_count_case = CaseStatement::new();
        let mut country_case = CaseStatement::new();
        let mut source_case = CaseStatement::new();
        let mut device_case = CaseStatement::new();

        for record in records {
            let id_cond = click_rollup_monthly::Column::Id.eq(record.id);

            click_count_case = click_count_case.case(
                id_cond.clone(),
                Expr::col(click_rollup_monthly::Column::ClickCount)
                    .add(Expr::val(record.click_delta)),
            );
            country_case = country_case.case(
                id_cond.clone(),
                SimpleExpr::Value(record.country_counts.clone().into()),
            );
            source_case = source_case.case(
                id_cond.clone(),
                SimpleExpr::Value(record.source_counts.clone().into()),
            );
            device_case = device_case.case(
                id_cond,
                SimpleExpr::Value(record.device_counts.clone().into()),
            );
        }

        click_count_case =
            click_count_case.finally(Expr::col(click_rollup_monthly::Column::ClickCount));
        country_case =
            country_case.finally(Expr::col(click_rollup_monthly::Column::CountryCounts));
        source_case = source_case.finally(Expr::col(click_rollup_monthly::Column::SourceCounts));
        device_case = device_case.finally(Expr::col(click_rollup_monthly::Column::DeviceCounts));

        let stmt = Query::update()
            .table(click_rollup_monthly::Entity)
            .value(click_rollup_monthly::Column::ClickCount, click_count_case)
            .value(click_rollup_monthly::Column::CountryCounts, country_case)
            .value(click_rollup_monthly::Column::SourceCounts, source_case)
            .value(click_rollup_monthly::Column::DeviceCounts, device_case)
            .and_where(Expr::col(click_rollup_monthly::Column::Id).is_in(ids))
            .to_owned();

        self.db.execute(&stmt).await?;
        Ok(())
    }

    // ============ 全局计数 ============

    /// 全局计数单例按批次总量累加（不存在则创建）
    pub async fn increment_global(&self, total: usize) -> anyhow::Result<()> {
        if total == 0 {
            return Ok(());
        }

        let backend = self.db.get_database_backend();
        let model = global_clicks::ActiveModel {
            id: Set(GLOBAL_ROW_ID),
            total_clicks: Set(total as i64),
        };

        // upsert：total_clicks 累加
        // SQLite/PostgreSQL: excluded.column；MySQL: VALUES(column)
        let on_conflict = match backend {
            DatabaseBackend::MySql => OnConflict::column(global_clicks::Column::Id)
                .value(
                    global_clicks::Column::TotalClicks,
                    Expr::col(global_clicks::Column::TotalClicks)
                        .add(Expr::cust("VALUES(total_clicks)")),
                )
                .to_owned(),
            _ => OnConflict::column(global_clicks::Column::Id)
                .value(
                    global_clicks::Column::TotalClicks,
                    Expr::col(global_clicks::Column::TotalClicks)
                        .add(Expr::cust("excluded.total_clicks")),
                )
                .to_owned(),
        };

        retry::with_retry("rollup_increment_global", self.retry_config, || async {
            global_clicks::Entity::insert(model.clone())
                .on_conflict(on_conflict.clone())
                .exec(self.db)
                .await
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to increment global clicks: {}", e))?;

        debug!("Global clicks incremented by {}", total);
        Ok(())
    }
}

/// 一条已存在汇总行的更新材料：计数增量 + 合并后的分布 JSON
struct RollupUpdate {
    id: i64,
    click_delta: i64,
    country_counts: String,
    source_counts: String,
    device_counts: String,
}

impl RollupUpdate {
    fn merged(
        id: i64,
        agg: &ClickAggregation,
        country_raw: &Option<String>,
        source_raw: &Option<String>,
        device_raw: &Option<String>,
    ) -> Self {
        let mut countries = parse_json_counts(country_raw);
        for (k, v) in &agg.countries {
            *countries.entry(k.clone()).or_insert(0) += v;
        }
        let mut sources = parse_json_counts(source_raw);
        for (k, v) in &agg.sources {
            *sources.entry(k.clone()).or_insert(0) += v;
        }
        let mut devices = parse_json_counts(device_raw);
        for (k, v) in &agg.devices {
            *devices.entry(k.clone()).or_insert(0) += v;
        }

        Self {
            id,
            click_delta: agg.count as i64,
            country_counts: to_json_string(&countries),
            source_counts: to_json_string(&sources),
            device_counts: to_json_string(&devices),
        }
    }
}
