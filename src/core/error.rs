use std::path::PathBuf;
use thiserror::Error;

/// 搜索流水线错误分类
///
/// 所有错误都意味着输入损坏或被移动，不是瞬时故障：核心内不做任何重试。
#[derive(Error, Debug)]
pub enum SearchError {
    /// 打开时路径/格式非法
    #[error("Invalid dataset {path:?}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// 建索引时遇到无法解析的行（整次构建作废）
    #[error("Malformed record at byte offset {offset}: {source}")]
    Parse {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    /// 点查时读取失败
    #[error("Failed to read record at byte offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// 建索引之后数据文件被修改
    #[error("Dataset {0:?} changed after the index was built")]
    DatasetChanged(PathBuf),

    /// 记录数超过 DocId (u32) 可表示范围
    #[error("Dataset holds more than {} records", u32::MAX)]
    TooManyRecords,

    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Search cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SearchError::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 用于多个并行 worker 的错误择一：取文件中最靠前的那个，保证报告与调度无关。
    pub(crate) fn offset(&self) -> u64 {
        match self {
            SearchError::Parse { offset, .. } | SearchError::Io { offset, .. } => *offset,
            _ => u64::MAX,
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
