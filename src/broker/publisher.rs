//! 流发布端
//!
//! 把点击事件 JSON 编码后发布到流；瞬时通道故障做有限次数的
//! 固定间隔重试，重试耗尽把错误交还调用方（emit 路径会记日志丢弃）。

use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::warn;

use super::channel::BrokerChannel;
use crate::config::get_config;
use crate::errors::Result;
use crate::events::ClickEvent;

/// 流发布端
#[derive(Clone)]
pub struct BrokerPublisher {
    channel: Arc<dyn BrokerChannel>,
    retries: u32,
    retry_delay: Duration,
}

impl BrokerPublisher {
    /// 从全局配置读取重试策略
    pub fn new(channel: Arc<dyn BrokerChannel>) -> Self {
        let config = get_config();
        Self::with_policy(
            channel,
            config.broker.publish_retries,
            Duration::from_millis(config.broker.publish_retry_delay_ms),
        )
    }

    pub fn with_policy(channel: Arc<dyn BrokerChannel>, retries: u32, retry_delay: Duration) -> Self {
        Self {
            channel,
            retries,
            retry_delay,
        }
    }

    /// 发布一条点击事件，返回流内条目 ID
    pub async fn publish_event(&self, event: &ClickEvent) -> Result<String> {
        let payload = serde_json::to_string(event)?;

        let mut attempt = 0;
        loop {
            match self.channel.publish(&payload).await {
                Ok(id) => return Ok(id),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Publish of event {} failed (attempt {}/{}): {}; retrying in {:?}",
                        event.event_id,
                        attempt,
                        self.retries + 1,
                        e,
                        self.retry_delay
                    );
                    sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
