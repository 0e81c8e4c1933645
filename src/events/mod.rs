pub mod emitter;
pub mod global;

pub use emitter::{BrokerEmitter, ClickEmitter, OutboxEmitter, spawn_emit};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use uuid::Uuid;

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
    #[default]
    Unknown,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mobile" => Ok(Self::Mobile),
            "desktop" => Ok(Self::Desktop),
            "tablet" => Ok(Self::Tablet),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!(
                "Invalid device type: '{}'. Valid: mobile, desktop, tablet, unknown",
                s
            )),
        }
    }
}

/// 标准化点击事件
///
/// 由生产端（重定向处理器）在点击时刻创建，经 outbox 或消息流投递，
/// 聚合后打上 processed 标记并在保留期后删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    /// 事件 ID（UUID v4，生产端分配）
    pub event_id: Uuid,
    /// 所属链接
    pub link_id: String,
    /// 所属账户
    pub user_id: String,
    /// 国家代码 (ISO 3166-1 alpha-2)，未知为 UNKNOWN
    pub country: String,
    /// 流量来源 token（instagram / direct / referral / ...）
    pub source: String,
    /// 设备类型
    pub device_type: DeviceType,
    /// 原始 User-Agent（可选）
    pub user_agent: Option<String>,
    /// 事件时间（点击发生时刻，不可变）
    pub timestamp: DateTime<Utc>,
}

impl ClickEvent {
    /// 创建新的点击事件
    pub fn new(link_id: String, user_id: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            link_id,
            user_id,
            country: "UNKNOWN".to_string(),
            source: "direct".to_string(),
            device_type: DeviceType::Unknown,
            user_agent: None,
            timestamp: Utc::now(),
        }
    }

    /// 设置归因信息
    pub fn with_attribution(mut self, attribution: crate::attribution::Attribution) -> Self {
        self.country = attribution.country;
        self.source = attribution.source;
        self.device_type = attribution.device_type;
        self
    }

    /// 设置原始 User-Agent
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}
