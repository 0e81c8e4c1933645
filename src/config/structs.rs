use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含基础设施配置：
/// - database: 数据库连接配置
/// - worker: 聚合批次参数
/// - broker: 消息流（Redis Streams）配置
/// - retention: 已处理事件的保留策略
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：CL，分隔符：__
    /// 示例：CL__WORKER__BATCH_SIZE=2000
    pub fn load() -> Self {
        use config::{Config, Environment, File};

        let path = "config.toml";

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖，前缀 CL，分隔符 __
            .add_source(
                Environment::with_prefix("CL")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 聚合批次参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// 单次认领的最大事件数
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// 单条批量 SQL 覆盖的最大行数
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// drain 模式下两个批次之间的间歇
    #[serde(default = "default_drain_pause_ms")]
    pub drain_pause_ms: u64,
}

/// 消息流配置（Redis Streams）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_broker_stream")]
    pub stream: String,
    #[serde(default = "default_broker_group")]
    pub group: String,
    #[serde(default = "default_broker_consumer")]
    pub consumer_name: String,
    #[serde(default = "default_broker_dead_letter_stream")]
    pub dead_letter_stream: String,
    /// XADD MAXLEN ~ 上限，作为发布侧的缓冲背压
    #[serde(default = "default_broker_max_len")]
    pub max_len: usize,
    /// 发布重试次数（瞬时连接故障）
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,
    /// 发布重试间隔（固定退避）
    #[serde(default = "default_publish_retry_delay_ms")]
    pub publish_retry_delay_ms: u64,
    /// 投递次数超过该值的消息转入死信流
    #[serde(default = "default_max_delivery")]
    pub max_delivery: u64,
    /// 消费端 XREADGROUP 的阻塞时长
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// 认领 pending 消息前要求的最小空闲时长
    #[serde(default = "default_claim_min_idle_ms")]
    pub claim_min_idle_ms: u64,
    /// 消费端单次读取的最大消息数
    #[serde(default = "default_consume_batch")]
    pub consume_batch: usize,
}

/// 已处理事件的保留策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// 已处理事件保留天数，之后由清理任务删除
    #[serde(default = "default_processed_event_days")]
    pub processed_event_days: u64,
    /// 单次删除批量大小
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: u64,
    /// 后台清理任务的运行间隔（小时）
    #[serde(default = "default_purge_interval_hours")]
    pub purge_interval_hours: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_database_url() -> String {
    "clicklytics.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_batch_size() -> u64 {
    5000
}

fn default_chunk_size() -> usize {
    700
}

fn default_drain_pause_ms() -> u64 {
    50
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_broker_stream() -> String {
    "clicklytics:events".to_string()
}

fn default_broker_group() -> String {
    "aggregators".to_string()
}

fn default_broker_consumer() -> String {
    "worker-1".to_string()
}

fn default_broker_dead_letter_stream() -> String {
    "clicklytics:events:dead".to_string()
}

fn default_broker_max_len() -> usize {
    1_000_000
}

fn default_publish_retries() -> u32 {
    3
}

fn default_publish_retry_delay_ms() -> u64 {
    1000
}

fn default_max_delivery() -> u64 {
    3
}

fn default_block_ms() -> u64 {
    5000
}

fn default_claim_min_idle_ms() -> u64 {
    60_000
}

fn default_consume_batch() -> usize {
    500
}

fn default_processed_event_days() -> u64 {
    7
}

fn default_purge_batch_size() -> u64 {
    10_000
}

fn default_purge_interval_hours() -> u64 {
    6
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_file() -> Option<String> {
    None
}

fn default_max_backups() -> u32 {
    7
}

fn default_enable_rotation() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            drain_pause_ms: default_drain_pause_ms(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            stream: default_broker_stream(),
            group: default_broker_group(),
            consumer_name: default_broker_consumer(),
            dead_letter_stream: default_broker_dead_letter_stream(),
            max_len: default_broker_max_len(),
            publish_retries: default_publish_retries(),
            publish_retry_delay_ms: default_publish_retry_delay_ms(),
            max_delivery: default_max_delivery(),
            block_ms: default_block_ms(),
            claim_min_idle_ms: default_claim_min_idle_ms(),
            consume_batch: default_consume_batch(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            processed_event_days: default_processed_event_days(),
            purge_batch_size: default_purge_batch_size(),
            purge_interval_hours: default_purge_interval_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}
