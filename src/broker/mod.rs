//! 消息流投递变体
//!
//! 与 outbox 路径功能等价的另一条投递链路，面向高点击量下的横向扩展：
//! 生产端发布到持久流，消费端经 consumer group 读取、手动 ack，
//! 投递次数超限的消息转入死信流。连接句柄懒建立、出错即失效，
//! 下一次调用重新建链而不是复用死句柄。

pub mod channel;
pub mod consumer;
pub mod publisher;

pub use channel::{BrokerChannel, Delivery, RedisBrokerChannel};
pub use consumer::BrokerConsumer;
pub use publisher::BrokerPublisher;
