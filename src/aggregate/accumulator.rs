//! 内存聚合累加器
//!
//! 对一个批次的事件做单遍扫描，产出四组待落库的聚合：
//! 链接计数、天汇总、月汇总、批次总量。所有增量都是可交换的整数加法，
//! 批内事件顺序不影响最终结果（认领顺序并非严格 FIFO）。

use std::collections::HashMap;

use chrono::NaiveDate;

use super::{ClickAggregation, day_bucket, month_bucket};
use crate::events::ClickEvent;

/// 一个批次的完整聚合结果
#[derive(Debug, Clone, Default)]
pub struct BatchAggregation {
    /// 批次事件总数
    pub total: usize,
    /// 链接维度聚合 (link_id -> agg)
    pub by_link: HashMap<String, ClickAggregation>,
    /// 天维度聚合 ((link_id, day) -> agg)
    pub daily: HashMap<(String, NaiveDate), ClickAggregation>,
    /// 月维度聚合 ((link_id, YYYY-MM) -> agg)
    pub monthly: HashMap<(String, String), ClickAggregation>,
}

/// 单遍聚合一个事件批次
///
/// 类别缺失时降级到默认桶（country → unknown，source → direct）——
/// 上游归因本应已经标准化，这里是兜底。
pub fn aggregate_events(events: &[ClickEvent]) -> BatchAggregation {
    let mut result = BatchAggregation {
        total: events.len(),
        by_link: HashMap::new(),
        daily: HashMap::new(),
        monthly: HashMap::new(),
    };

    for event in events {
        let country = if event.country.trim().is_empty() {
            "unknown"
        } else {
            event.country.as_str()
        };
        let source = if event.source.trim().is_empty() {
            "direct"
        } else {
            event.source.as_str()
        };
        let device = event.device_type.as_ref();

        result
            .by_link
            .entry(event.link_id.clone())
            .or_default()
            .observe(country, source, device);

        let day = day_bucket(event.timestamp);
        result
            .daily
            .entry((event.link_id.clone(), day))
            .or_default()
            .observe(country, source, device);

        let month = month_bucket(event.timestamp);
        result
            .monthly
            .entry((event.link_id.clone(), month))
            .or_default()
            .observe(country, source, device);
    }

    result
}
