//! 流通道抽象与 Redis Streams 实现
//!
//! BrokerChannel 是进程内唯一接触消息协议的接口，测试用假通道替换。

use std::sync::Arc;

use async_trait::async_trait;
use redis::streams::{
    StreamClaimReply, StreamMaxlen, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::errors::{ClicklyticsError, Result};

/// 一条已投递、待确认的消息
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 流内条目 ID
    pub id: String,
    /// 消息载荷（JSON 编码的 ClickEvent）
    pub payload: String,
    /// 累计投递次数（首轮为 1）
    pub delivery_count: u64,
}

/// 流通道操作
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// 幂等地声明拓扑（流 + consumer group）
    async fn assert_topology(&self) -> Result<()>;

    /// 发布一条消息，返回条目 ID
    async fn publish(&self, payload: &str) -> Result<String>;

    /// 读取新消息（consumer group 语义，读到即进入 pending）
    async fn fetch_new(&self, count: usize, block_ms: u64) -> Result<Vec<Delivery>>;

    /// 认领空闲超时的 pending 消息（崩溃消费者留下的）
    async fn claim_stale(&self, min_idle_ms: u64, count: usize) -> Result<Vec<Delivery>>;

    /// 确认消息（仅在聚合效果持久化之后调用）
    async fn ack(&self, ids: &[String]) -> Result<()>;

    /// 把消息转入死信流并确认原条目
    async fn dead_letter(&self, delivery: &Delivery) -> Result<()>;
}

/// Redis Streams 通道
pub struct RedisBrokerChannel {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护；出错置空，下次调用重建
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    stream: String,
    group: String,
    consumer_name: String,
    dead_letter_stream: String,
    max_len: usize,
}

impl RedisBrokerChannel {
    /// 从配置创建通道；只校验 URL，连接懒建立
    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.clone()).map_err(|e| {
            ClicklyticsError::broker_connection(format!(
                "Failed to create Redis client for {}: {}",
                config.url, e
            ))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            stream: config.stream.clone(),
            group: config.group.clone(),
            consumer_name: config.consumer_name.clone(),
            dead_letter_stream: config.dead_letter_stream.clone(),
            max_len: config.max_len,
        })
    }

    /// 获取或建立持久连接
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        // 首先尝试读取现有连接
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        // 需要建立新连接
        let mut conn_guard = self.connection.write().await;

        // 双重检查，避免竞态条件
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let new_conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                ClicklyticsError::broker_connection(format!("Redis connection failed: {}", e))
            })?;
        *conn_guard = Some(new_conn.clone());
        debug!("Broker connection established and cached");

        Ok(new_conn)
    }

    /// 重置连接（在连接错误时调用）
    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Broker connection reset due to error");
    }

    /// 统一的错误出口：重置缓存句柄再向上抛
    async fn fail<T>(&self, op: &str, err: redis::RedisError) -> Result<T> {
        self.reset_connection().await;
        Err(ClicklyticsError::broker_operation(format!(
            "{} failed: {}",
            op, err
        )))
    }
}

#[async_trait]
impl BrokerChannel for RedisBrokerChannel {
    async fn assert_topology(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;

        // XGROUP CREATE ... MKSTREAM：流不存在则创建；组已存在报 BUSYGROUP，视为成功
        let result: redis::RedisResult<String> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;

        match result {
            Ok(_) => {
                debug!(
                    "Broker topology created: stream '{}', group '{}'",
                    self.stream, self.group
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(
                    "Broker topology already exists: stream '{}', group '{}'",
                    self.stream, self.group
                );
                Ok(())
            }
            Err(e) => self.fail("assert_topology", e).await,
        }
    }

    async fn publish(&self, payload: &str) -> Result<String> {
        let mut conn = self.get_connection().await?;

        // MAXLEN ~ 截断作为发布侧的缓冲上限
        let result: redis::RedisResult<String> = conn
            .xadd_maxlen(
                &self.stream,
                StreamMaxlen::Approx(self.max_len),
                "*",
                &[("payload", payload)],
            )
            .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) => self.fail("publish", e).await,
        }
    }

    async fn fetch_new(&self, count: usize, block_ms: u64) -> Result<Vec<Delivery>> {
        let mut conn = self.get_connection().await?;

        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(count)
            .block(block_ms as usize);

        let reply: StreamReadReply =
            match conn.xread_options(&[self.stream.as_str()], &[">"], &opts).await {
                Ok(reply) => reply,
                Err(e) => return self.fail("fetch_new", e).await,
            };

        let mut deliveries = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let Some(payload) = entry.get::<String>("payload") else {
                    warn!("Stream entry {} has no payload field, skipped", entry.id);
                    continue;
                };
                deliveries.push(Delivery {
                    id: entry.id,
                    payload,
                    delivery_count: 1,
                });
            }
        }
        Ok(deliveries)
    }

    async fn claim_stale(&self, min_idle_ms: u64, count: usize) -> Result<Vec<Delivery>> {
        let mut conn = self.get_connection().await?;

        // pending 摘要带投递次数；只认领空闲超过阈值的条目
        let pending: StreamPendingCountReply = match conn
            .xpending_count(&self.stream, &self.group, "-", "+", count)
            .await
        {
            Ok(p) => p,
            Err(e) => return self.fail("claim_stale:xpending", e).await,
        };

        let stale: Vec<(String, u64)> = pending
            .ids
            .iter()
            .filter(|p| p.last_delivered_ms as u64 >= min_idle_ms)
            .map(|p| (p.id.clone(), p.times_delivered as u64))
            .collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let stale_ids: Vec<&str> = stale.iter().map(|(id, _)| id.as_str()).collect();
        let claimed: StreamClaimReply = match conn
            .xclaim(
                &self.stream,
                &self.group,
                &self.consumer_name,
                min_idle_ms as usize,
                &stale_ids,
            )
            .await
        {
            Ok(c) => c,
            Err(e) => return self.fail("claim_stale:xclaim", e).await,
        };

        let counts: std::collections::HashMap<&str, u64> =
            stale.iter().map(|(id, n)| (id.as_str(), *n)).collect();

        let mut deliveries = Vec::new();
        for entry in claimed.ids {
            let Some(payload) = entry.get::<String>("payload") else {
                warn!("Claimed entry {} has no payload field, skipped", entry.id);
                continue;
            };
            // XCLAIM 本身会使投递计数 +1
            let delivery_count = counts.get(entry.id.as_str()).copied().unwrap_or(1) + 1;
            deliveries.push(Delivery {
                id: entry.id,
                payload,
                delivery_count,
            });
        }
        Ok(deliveries)
    }

    async fn ack(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<i64> = conn.xack(&self.stream, &self.group, ids).await;

        match result {
            Ok(acked) => {
                debug!("Acked {} of {} messages", acked, ids.len());
                Ok(())
            }
            Err(e) => self.fail("ack", e).await,
        }
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let result: redis::RedisResult<String> = conn
            .xadd(
                &self.dead_letter_stream,
                "*",
                &[
                    ("payload", delivery.payload.as_str()),
                    ("origin_id", delivery.id.as_str()),
                ],
            )
            .await;
        if let Err(e) = result {
            return self.fail("dead_letter:xadd", e).await;
        }

        let result: redis::RedisResult<i64> = conn
            .xack(&self.stream, &self.group, &[delivery.id.as_str()])
            .await;
        match result {
            Ok(_) => {
                warn!(
                    "Message {} routed to dead letter stream '{}' (delivered {} times)",
                    delivery.id, self.dead_letter_stream, delivery.delivery_count
                );
                Ok(())
            }
            Err(e) => self.fail("dead_letter:xack", e).await,
        }
    }
}
