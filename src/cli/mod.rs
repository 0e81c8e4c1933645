//! 运维命令入口
//!
//! 聚合管道自身没有常驻服务面，这里暴露给外部调度器/脚本的操作：
//! 单批聚合、排空、清理、流拓扑声明、长驻消费循环。

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::time::Duration;

use crate::aggregate::{AggregationWorker, RetentionTask};
use crate::broker::{BrokerChannel, BrokerConsumer, RedisBrokerChannel};
use crate::config::{StaticConfig, get_config};
use crate::storage::SeaOrmStorage;
use crate::storage::backend::{infer_backend_from_url, normalize_backend_name};

#[derive(Parser)]
#[command(name = "clicklytics", version, about = "Click-analytics aggregation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 处理一个聚合批次
    Batch {
        /// 单次认领的最大事件数（默认取配置）
        #[arg(long)]
        batch_size: Option<u64>,
        /// 单条批量 SQL 覆盖的最大行数（默认取配置）
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// 连续处理批次直到 outbox 排空
    Drain {
        #[arg(long)]
        batch_size: Option<u64>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// 删除保留期之外的已处理事件
    Purge,
    /// 消息流操作
    Broker {
        #[command(subcommand)]
        command: BrokerCommands,
    },
    /// 输出示例 TOML 配置
    SampleConfig,
}

#[derive(Subcommand)]
pub enum BrokerCommands {
    /// 幂等地声明流拓扑（stream + consumer group）
    Setup,
    /// 运行长驻消费循环
    Consume,
}

/// 执行解析好的命令
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::SampleConfig => {
            println!("{}", StaticConfig::generate_sample_config());
            Ok(())
        }
        Commands::Batch {
            batch_size,
            chunk_size,
        } => {
            let config = get_config();
            let worker = AggregationWorker::new(open_storage().await?);
            let outcome = worker
                .run_batch(
                    batch_size.unwrap_or(config.worker.batch_size),
                    chunk_size.unwrap_or(config.worker.chunk_size),
                )
                .await?;
            println!("processed {} events", outcome.processed);
            Ok(())
        }
        Commands::Drain {
            batch_size,
            chunk_size,
        } => {
            let config = get_config();
            let worker = AggregationWorker::new(open_storage().await?);
            let total = worker
                .drain(
                    batch_size.unwrap_or(config.worker.batch_size),
                    chunk_size.unwrap_or(config.worker.chunk_size),
                    Duration::from_millis(config.worker.drain_pause_ms),
                )
                .await?;
            println!("drained {} events", total);
            Ok(())
        }
        Commands::Purge => {
            let task = RetentionTask::new(open_storage().await?);
            let report = task.run_cleanup().await?;
            println!(
                "purged {} processed events",
                report.processed_events_deleted
            );
            Ok(())
        }
        Commands::Broker { command } => {
            let config = get_config();
            let channel: Arc<dyn BrokerChannel> =
                Arc::new(RedisBrokerChannel::from_config(&config.broker)?);
            match command {
                BrokerCommands::Setup => {
                    channel.assert_topology().await?;
                    println!(
                        "broker topology asserted: stream '{}', group '{}'",
                        config.broker.stream, config.broker.group
                    );
                    Ok(())
                }
                BrokerCommands::Consume => {
                    let consumer = BrokerConsumer::new(channel, open_storage().await?);
                    consumer.run_loop().await
                }
            }
        }
    }
}

/// 按配置打开存储后端（含迁移）
async fn open_storage() -> anyhow::Result<Arc<SeaOrmStorage>> {
    let config = get_config();
    let backend = normalize_backend_name(&infer_backend_from_url(
        &config.database.database_url,
    )?);
    let storage = SeaOrmStorage::new(&config.database.database_url, &backend).await?;
    Ok(Arc::new(storage))
}
