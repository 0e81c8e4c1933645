//! 流消费端
//!
//! 长驻循环：优先认领崩溃消费者留下的 pending 消息，再读新消息；
//! 聚合效果持久化成功之后才 ack——ack 之前进程被杀，消息留在 pending
//! 列表里等待下一轮认领。投递次数超限或载荷无法解析的消息转入死信流。

use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use super::channel::{BrokerChannel, Delivery};
use crate::aggregate::AggregationWorker;
use crate::config::get_config;
use crate::events::ClickEvent;
use crate::storage::SeaOrmStorage;

/// 流消费端
pub struct BrokerConsumer {
    channel: Arc<dyn BrokerChannel>,
    worker: AggregationWorker,
    chunk_size: usize,
    consume_batch: usize,
    block_ms: u64,
    claim_min_idle_ms: u64,
    max_delivery: u64,
}

impl BrokerConsumer {
    pub fn new(channel: Arc<dyn BrokerChannel>, storage: Arc<SeaOrmStorage>) -> Self {
        let config = get_config();
        Self {
            channel,
            worker: AggregationWorker::new(storage),
            chunk_size: config.worker.chunk_size,
            consume_batch: config.broker.consume_batch,
            block_ms: config.broker.block_ms,
            claim_min_idle_ms: config.broker.claim_min_idle_ms,
            max_delivery: config.broker.max_delivery,
        }
    }

    /// 处理一轮消息，返回成功聚合的事件数
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        // 1. 先认领空闲超时的 pending 消息
        let mut deliveries = self
            .channel
            .claim_stale(self.claim_min_idle_ms, self.consume_batch)
            .await?;

        // 2. 再补足新消息
        if deliveries.len() < self.consume_batch {
            let fresh = self
                .channel
                .fetch_new(self.consume_batch - deliveries.len(), self.block_ms)
                .await?;
            deliveries.extend(fresh);
        }

        if deliveries.is_empty() {
            return Ok(0);
        }

        // 3. 分拣：超限/毒消息进死信流，可用消息解码待聚合
        let mut events: Vec<ClickEvent> = Vec::with_capacity(deliveries.len());
        let mut ack_ids: Vec<String> = Vec::with_capacity(deliveries.len());

        for delivery in &deliveries {
            if delivery.delivery_count > self.max_delivery {
                warn!(
                    "Message {} exceeded delivery budget ({} > {}), dead-lettering",
                    delivery.id, delivery.delivery_count, self.max_delivery
                );
                self.dead_letter_quietly(delivery).await;
                continue;
            }

            match serde_json::from_str::<ClickEvent>(&delivery.payload) {
                Ok(event) => {
                    events.push(event);
                    ack_ids.push(delivery.id.clone());
                }
                Err(e) => {
                    warn!("Message {} has undecodable payload ({}), dead-lettering", delivery.id, e);
                    self.dead_letter_quietly(delivery).await;
                }
            }
        }

        if events.is_empty() {
            return Ok(0);
        }

        // 4. 聚合落库，成功后才 ack
        self.worker.apply_events(&events, self.chunk_size).await?;
        self.channel.ack(&ack_ids).await?;

        debug!("Consumed and aggregated {} events", events.len());
        Ok(events.len())
    }

    /// 长驻消费循环
    pub async fn run_loop(&self) -> anyhow::Result<()> {
        self.channel.assert_topology().await?;
        info!("Broker consumer loop started");

        loop {
            match self.run_once().await {
                // 空轮次：fetch_new 的 block 已经完成了等待，直接下一轮
                Ok(0) => {}
                Ok(n) => debug!("Consumer round processed {} events", n),
                Err(e) => {
                    error!("Consumer round failed: {}; backing off", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// 死信路由失败只记日志：消息仍在 pending，之后会被重新认领
    async fn dead_letter_quietly(&self, delivery: &Delivery) {
        if let Err(e) = self.channel.dead_letter(delivery).await {
            error!("Dead-letter routing for {} failed: {}", delivery.id, e);
        }
    }
}
