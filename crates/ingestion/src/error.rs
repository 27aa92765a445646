//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 数据源 ID 重复注册
    #[error("source {source_id} is already registered")]
    DuplicateSource {
        /// 数据源 ID
        source_id: String,
    },

    /// 数据源不存在
    #[error("source {source_id} is not registered")]
    UnknownSource {
        /// 数据源 ID
        source_id: String,
    },

    /// 数据源未在监听
    #[error("source {source_id} is not listening")]
    SourceNotListening {
        /// 数据源 ID
        source_id: String,
    },
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
