//! 点击聚合
//!
//! 负责把 outbox / 消息流里的原始点击事件滚入链接计数、天/月汇总
//! 和全局计数：内存单遍聚合，分块批量落库，落库成功后才打处理标记。

pub mod accumulator;
pub mod retention;
pub mod rollup;
pub mod worker;

pub use accumulator::{BatchAggregation, aggregate_events};
pub use retention::RetentionTask;
pub use rollup::RollupWriter;
pub use worker::{AggregationWorker, BatchOutcome};

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

/// 单个桶的点击聚合数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickAggregation {
    /// 点击计数
    pub count: usize,
    /// 国家统计 (country -> count)
    pub countries: HashMap<String, usize>,
    /// 流量来源统计 (source -> count)
    pub sources: HashMap<String, usize>,
    /// 设备统计 (device -> count)
    pub devices: HashMap<String, usize>,
}

impl ClickAggregation {
    /// 计入一次点击
    pub fn observe(&mut self, country: &str, source: &str, device: &str) {
        self.count += 1;
        *self.countries.entry(country.to_string()).or_insert(0) += 1;
        *self.sources.entry(source.to_string()).or_insert(0) += 1;
        *self.devices.entry(device.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &ClickAggregation) {
        self.count += other.count;
        for (k, v) in &other.countries {
            *self.countries.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.sources {
            *self.sources.entry(k.clone()).or_insert(0) += v;
        }
        for (k, v) in &other.devices {
            *self.devices.entry(k.clone()).or_insert(0) += v;
        }
    }
}

/// UTC 日历天键（取事件自身时间戳，处理延迟不影响归属）
pub fn day_bucket(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// 月份键，格式 YYYY-MM（UTC）
pub fn month_bucket(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

/// 解析 JSON 计数字段（损坏或缺失时返回空表）
pub fn parse_json_counts(raw: &Option<String>) -> HashMap<String, usize> {
    raw.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// 计数表序列化为 JSON 字符串
pub fn to_json_string(map: &HashMap<String, usize>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_keys_use_utc_event_time() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
        assert_eq!(day_bucket(ts).to_string(), "2024-05-01");
        assert_eq!(month_bucket(ts), "2024-05");
    }

    #[test]
    fn test_parse_json_counts_tolerates_garbage() {
        assert!(parse_json_counts(&None).is_empty());
        assert!(parse_json_counts(&Some("not json".to_string())).is_empty());
        let parsed = parse_json_counts(&Some(r#"{"US":2,"AR":1}"#.to_string()));
        assert_eq!(parsed.get("US"), Some(&2));
        assert_eq!(parsed.get("AR"), Some(&1));
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut a = ClickAggregation::default();
        a.observe("US", "direct", "mobile");
        let mut b = ClickAggregation::default();
        b.observe("US", "instagram", "desktop");
        b.observe("AR", "direct", "mobile");

        a.merge(&b);
        assert_eq!(a.count, 3);
        assert_eq!(a.countries.get("US"), Some(&2));
        assert_eq!(a.countries.get("AR"), Some(&1));
        assert_eq!(a.sources.get("direct"), Some(&2));
        assert_eq!(a.devices.get("mobile"), Some(&2));
    }
}
