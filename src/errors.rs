use std::fmt;

#[derive(Debug, Clone)]
pub enum ClicklyticsError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    BrokerConnection(String),
    BrokerOperation(String),
    Serialization(String),
    Validation(String),
    DateParse(String),
}

impl ClicklyticsError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ClicklyticsError::DatabaseConfig(_) => "E001",
            ClicklyticsError::DatabaseConnection(_) => "E002",
            ClicklyticsError::DatabaseOperation(_) => "E003",
            ClicklyticsError::BrokerConnection(_) => "E004",
            ClicklyticsError::BrokerOperation(_) => "E005",
            ClicklyticsError::Serialization(_) => "E006",
            ClicklyticsError::Validation(_) => "E007",
            ClicklyticsError::DateParse(_) => "E008",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ClicklyticsError::DatabaseConfig(_) => "Database Configuration Error",
            ClicklyticsError::DatabaseConnection(_) => "Database Connection Error",
            ClicklyticsError::DatabaseOperation(_) => "Database Operation Error",
            ClicklyticsError::BrokerConnection(_) => "Broker Connection Error",
            ClicklyticsError::BrokerOperation(_) => "Broker Operation Error",
            ClicklyticsError::Serialization(_) => "Serialization Error",
            ClicklyticsError::Validation(_) => "Validation Error",
            ClicklyticsError::DateParse(_) => "Date Parse Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ClicklyticsError::DatabaseConfig(msg) => msg,
            ClicklyticsError::DatabaseConnection(msg) => msg,
            ClicklyticsError::DatabaseOperation(msg) => msg,
            ClicklyticsError::BrokerConnection(msg) => msg,
            ClicklyticsError::BrokerOperation(msg) => msg,
            ClicklyticsError::Serialization(msg) => msg,
            ClicklyticsError::Validation(msg) => msg,
            ClicklyticsError::DateParse(msg) => msg,
        }
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ClicklyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ClicklyticsError {}

// 便捷的构造函数
impl ClicklyticsError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::DatabaseOperation(msg.into())
    }

    pub fn broker_connection<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::BrokerConnection(msg.into())
    }

    pub fn broker_operation<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::BrokerOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::Serialization(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::Validation(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        ClicklyticsError::DateParse(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for ClicklyticsError {
    fn from(err: sea_orm::DbErr) -> Self {
        ClicklyticsError::DatabaseOperation(err.to_string())
    }
}

impl From<redis::RedisError> for ClicklyticsError {
    fn from(err: redis::RedisError) -> Self {
        ClicklyticsError::BrokerOperation(err.to_string())
    }
}

impl From<serde_json::Error> for ClicklyticsError {
    fn from(err: serde_json::Error) -> Self {
        ClicklyticsError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for ClicklyticsError {
    fn from(err: chrono::ParseError) -> Self {
        ClicklyticsError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClicklyticsError>;
