use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 默认接受的数据集扩展名
pub const DEFAULT_EXTENSIONS: &[&str] = &["txt", "json", "jsonl", "ndjson"];

/// 下一层排除哪些已出现的 id
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RevisitPolicy {
    /// 只排除上一层（种子或上一层的 id）
    #[default]
    PreviousTier,
    /// 排除种子与之前所有层出现过的 id；环状数据也保证收敛
    AllTiers,
}

/// 搜索配置（TOML）
///
/// 所有字段都有默认值；0 表示由 `AdaptiveScheduler` 按主机负载决定。
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// 每个并发批次的索引条目数
    pub batch_size: usize,
    /// 建索引时每个并行分块的字节数
    pub chunk_bytes: usize,
    /// rayon worker 数
    pub threads: usize,
    pub monitor_interval_secs: u64,
    pub revisit: RevisitPolicy,
    pub extensions: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            batch_size: 0,
            chunk_bytes: 0,
            threads: 0,
            monitor_interval_secs: 60,
            revisit: RevisitPolicy::default(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SearchConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {:?}", path))
    }

    /// 显式路径优先；否则读取用户配置目录下的 `cite-tier/config.toml`（存在时）；都没有则用默认值。
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(p) = explicit {
            return Self::load_file(p);
        }
        match Self::default_path() {
            Some(p) if p.is_file() => {
                tracing::debug!("Loading config from {:?}", p);
                Self::load_file(&p)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cite-tier").join("config.toml"))
    }

    pub fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}
