//! 点击事件发射器
//!
//! emit 本身等待持久化写入完成（至少一次投递的保证在存储层），
//! 调用方若不能阻塞（重定向响应路径）应使用 spawn_emit 分离执行。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{trace, warn};

use super::ClickEvent;
use crate::broker::BrokerPublisher;
use crate::outbox::EventStore;
use crate::storage::SeaOrmStorage;

/// 点击事件 Sink
#[async_trait]
pub trait ClickEmitter: Send + Sync {
    async fn emit(&self, event: ClickEvent) -> anyhow::Result<()>;
}

/// 直接写入 outbox 集合的发射器
pub struct OutboxEmitter {
    storage: Arc<SeaOrmStorage>,
}

impl OutboxEmitter {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ClickEmitter for OutboxEmitter {
    async fn emit(&self, event: ClickEvent) -> anyhow::Result<()> {
        self.storage.append(event).await
    }
}

/// 经消息流投递的发射器（解耦/横向扩展的摄入路径）
pub struct BrokerEmitter {
    publisher: BrokerPublisher,
}

impl BrokerEmitter {
    pub fn new(publisher: BrokerPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl ClickEmitter for BrokerEmitter {
    async fn emit(&self, event: ClickEvent) -> anyhow::Result<()> {
        self.publisher.publish_event(&event).await?;
        Ok(())
    }
}

/// 分离执行的发射入口
///
/// 写入失败记日志后丢弃，绝不向调用方传播——丢一条分析事件可接受，
/// 拖慢或失败一次重定向不可接受。
pub fn spawn_emit(emitter: Arc<dyn ClickEmitter>, event: ClickEvent) {
    tokio::spawn(async move {
        let event_id = event.event_id;
        match emitter.emit(event).await {
            Ok(_) => trace!("Click event {} emitted", event_id),
            Err(e) => warn!("Click event {} emit failed (dropped): {}", event_id, e),
        }
    });
}
